//! Persistent chain state.
//!
//! Everything lives in one keyspace under 1-byte prefixes:
//!
//! | prefix    | key                  | value                         |
//! |-----------|----------------------|-------------------------------|
//! | `T`       | transition id        | canonical transition bytes    |
//! | `S`       | transition id        | decision status               |
//! | `E`       | transition id        | accepted epoch                |
//! | `U`       | utxo id              | serialized UTXO               |
//! | `F`       | addr `||` utxo id    | empty (funds index)           |
//! | `M`       | asset id             | managed-asset record          |
//! | `/status` |                      | db-initialized marker         |
//!
//! Values (except raw transition bytes, which carry their own prefix) are
//! codec-versioned. Writes buffer in a [`VersionDb`]; a decision commits
//! them atomically.

use std::sync::Arc;

use parking_lot::RwLock;
use snowdag_codec::{CodecManager, Pack, Unpack};
use snowdag_consensus::Status;
use snowdag_db::{
    Commitable, Database, Iteratee, KeyValueDeleter, KeyValueReader, KeyValueWriter, VersionDb,
};
use snowdag_ids::{Id, ShortId, ID_LEN, SHORT_ID_LEN};
use tracing::trace;

use crate::fx::ManagedAssetRecord;
use crate::utxo::Utxo;
use crate::{LedgerError, Result};

const PREFIX_TX: u8 = b'T';
const PREFIX_STATUS: u8 = b'S';
const PREFIX_EPOCH: u8 = b'E';
const PREFIX_UTXO: u8 = b'U';
const PREFIX_FUNDS: u8 = b'F';
const PREFIX_MANAGED: u8 = b'M';

const KEY_DB_INITIALIZED: &[u8] = b"/status";

fn key(prefix: u8, id: &Id) -> Vec<u8> {
    let mut k = Vec::with_capacity(1 + ID_LEN);
    k.push(prefix);
    k.extend_from_slice(id.as_bytes());
    k
}

fn funds_key(addr: &ShortId, utxo_id: &Id) -> Vec<u8> {
    let mut k = Vec::with_capacity(1 + SHORT_ID_LEN + ID_LEN);
    k.push(PREFIX_FUNDS);
    k.extend_from_slice(addr.as_bytes());
    k.extend_from_slice(utxo_id.as_bytes());
    k
}

fn status_code(status: Status) -> u8 {
    match status {
        Status::Unknown => 0,
        Status::Processing => 1,
        Status::Accepted => 2,
        Status::Rejected => 3,
    }
}

fn status_from_code(code: u8) -> Result<Status> {
    match code {
        0 => Ok(Status::Unknown),
        1 => Ok(Status::Processing),
        2 => Ok(Status::Accepted),
        3 => Ok(Status::Rejected),
        other => Err(LedgerError::InvalidTx(format!(
            "invalid stored status code {other}"
        ))),
    }
}

/// The ledger's persistent state.
pub struct ChainState {
    db: VersionDb,
    codec: RwLock<CodecManager>,
}

impl ChainState {
    pub fn new(db: Arc<dyn Database>, codec: CodecManager) -> Self {
        Self {
            db: VersionDb::new(db),
            codec: RwLock::new(codec),
        }
    }

    /// Switches the version new values serialize under.
    pub fn set_codec_version(&self, version: u16) {
        self.codec.write().set_current_version(version);
    }

    pub fn codec_version(&self) -> u16 {
        self.codec.read().current_version()
    }

    /// Serializes a value under the current codec version.
    pub fn marshal<T: Pack>(&self, value: &T) -> Vec<u8> {
        self.codec.read().marshal(value)
    }

    /// Deserializes a versioned value, returning the version it carried.
    pub fn unmarshal<T: Unpack>(&self, bytes: &[u8]) -> Result<(u16, T)> {
        Ok(self.codec.read().unmarshal(bytes)?)
    }

    // --- transitions ---

    pub fn put_tx_bytes(&self, id: &Id, bytes: &[u8]) -> Result<()> {
        self.db.put(&key(PREFIX_TX, id), bytes)?;
        Ok(())
    }

    pub fn tx_bytes(&self, id: &Id) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(&key(PREFIX_TX, id))?)
    }

    pub fn set_status(&self, id: &Id, status: Status) -> Result<()> {
        trace!(transition = %id, %status, "recording status");
        let value = self.codec.read().marshal(&status_code(status));
        self.db.put(&key(PREFIX_STATUS, id), &value)?;
        Ok(())
    }

    pub fn status(&self, id: &Id) -> Result<Status> {
        match self.db.get(&key(PREFIX_STATUS, id))? {
            None => Ok(Status::Unknown),
            Some(value) => {
                let (_, code): (u16, u8) = self.codec.read().unmarshal(&value)?;
                status_from_code(code)
            }
        }
    }

    pub fn set_epoch(&self, id: &Id, epoch: u32) -> Result<()> {
        let value = self.codec.read().marshal(&epoch);
        self.db.put(&key(PREFIX_EPOCH, id), &value)?;
        Ok(())
    }

    pub fn epoch(&self, id: &Id) -> Result<Option<u32>> {
        match self.db.get(&key(PREFIX_EPOCH, id))? {
            None => Ok(None),
            Some(value) => {
                let (_, epoch): (u16, u32) = self.codec.read().unmarshal(&value)?;
                Ok(Some(epoch))
            }
        }
    }

    // --- utxos ---

    /// Writes a fresh UTXO and indexes it under every owner address.
    pub fn fund_utxo(&self, utxo: &Utxo) -> Result<()> {
        let id = utxo.id();
        trace!(utxo = %id, "funding utxo");
        let value = self.codec.read().marshal(utxo);
        self.db.put(&key(PREFIX_UTXO, &id), &value)?;
        for addr in &utxo.owners.addresses {
            self.db.put(&funds_key(addr, &id), &[])?;
        }
        Ok(())
    }

    /// Removes a UTXO and its funds-index entries.
    pub fn spend_utxo(&self, id: &Id) -> Result<Utxo> {
        let utxo = self.utxo(id)?.ok_or(LedgerError::UnknownUtxo(*id))?;
        trace!(utxo = %id, "spending utxo");
        self.db.delete(&key(PREFIX_UTXO, id))?;
        for addr in &utxo.owners.addresses {
            self.db.delete(&funds_key(addr, id))?;
        }
        Ok(utxo)
    }

    pub fn utxo(&self, id: &Id) -> Result<Option<Utxo>> {
        match self.db.get(&key(PREFIX_UTXO, id))? {
            None => Ok(None),
            Some(value) => {
                let (_, utxo): (u16, Utxo) = self.codec.read().unmarshal(&value)?;
                Ok(Some(utxo))
            }
        }
    }

    /// UTXO ids funding `addr`, in id order, strictly after `start`, at most
    /// `limit`.
    pub fn funds(&self, addr: &ShortId, start: &Id, limit: usize) -> Result<Vec<Id>> {
        let mut prefix = Vec::with_capacity(1 + SHORT_ID_LEN);
        prefix.push(PREFIX_FUNDS);
        prefix.extend_from_slice(addr.as_bytes());

        let mut ids = Vec::new();
        let mut iter = self.db.new_iterator_with_prefix(&prefix);
        while ids.len() < limit && iter.next() {
            let raw = &iter.key()[prefix.len()..];
            let utxo_id = Id::from_slice(raw)
                .map_err(|_| LedgerError::InvalidTx("corrupt funds index key".to_string()))?;
            if utxo_id > *start {
                ids.push(utxo_id);
            }
        }
        iter.release();
        Ok(ids)
    }

    // --- managed assets ---

    pub fn put_managed_asset(&self, asset_id: &Id, record: &ManagedAssetRecord) -> Result<()> {
        let value = self.codec.read().marshal(record);
        self.db.put(&key(PREFIX_MANAGED, asset_id), &value)?;
        Ok(())
    }

    pub fn managed_asset(&self, asset_id: &Id) -> Result<Option<ManagedAssetRecord>> {
        match self.db.get(&key(PREFIX_MANAGED, asset_id))? {
            None => Ok(None),
            Some(value) => {
                let (_, record): (u16, ManagedAssetRecord) =
                    self.codec.read().unmarshal(&value)?;
                Ok(Some(record))
            }
        }
    }

    // --- lifecycle ---

    pub fn db_initialized(&self) -> Result<bool> {
        Ok(self.db.has(KEY_DB_INITIALIZED)?)
    }

    pub fn set_db_initialized(&self) -> Result<()> {
        self.db.put(KEY_DB_INITIALIZED, &[])?;
        Ok(())
    }

    /// Publishes all buffered writes atomically.
    pub fn commit(&self) -> Result<()> {
        self.db.commit()?;
        Ok(())
    }

    /// Discards all buffered writes.
    pub fn abort(&self) {
        self.db.abort();
    }

    pub fn close(&self) -> Result<()> {
        self.db.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utxo::{OutputOwners, UtxoId};
    use snowdag_db::MemDb;

    fn state() -> ChainState {
        ChainState::new(Arc::new(MemDb::new()), CodecManager::new())
    }

    fn addr(byte: u8) -> ShortId {
        ShortId::from_bytes([byte; 20])
    }

    fn utxo(tx_byte: u8, index: u32, owner: ShortId) -> Utxo {
        Utxo {
            utxo_id: UtxoId::new(Id::from_bytes([tx_byte; 32]), index),
            asset_id: Id::from_bytes([9; 32]),
            amount: 100,
            payload: Vec::new(),
            owners: OutputOwners::single(owner),
        }
    }

    #[test]
    fn status_defaults_to_unknown() {
        let state = state();
        let id = Id::from_bytes([1; 32]);
        assert_eq!(state.status(&id).unwrap(), Status::Unknown);

        state.set_status(&id, Status::Processing).unwrap();
        assert_eq!(state.status(&id).unwrap(), Status::Processing);
        state.set_status(&id, Status::Accepted).unwrap();
        assert_eq!(state.status(&id).unwrap(), Status::Accepted);
    }

    #[test]
    fn epochs_roundtrip() {
        let state = state();
        let id = Id::from_bytes([1; 32]);
        assert_eq!(state.epoch(&id).unwrap(), None);
        state.set_epoch(&id, 4).unwrap();
        assert_eq!(state.epoch(&id).unwrap(), Some(4));
    }

    #[test]
    fn fund_and_spend_maintain_funds_index() {
        let state = state();
        let owner = addr(1);
        let utxo = utxo(2, 0, owner);
        state.fund_utxo(&utxo).unwrap();

        assert_eq!(state.utxo(&utxo.id()).unwrap(), Some(utxo.clone()));
        assert_eq!(
            state.funds(&owner, &Id::EMPTY, 10).unwrap(),
            vec![utxo.id()]
        );

        let spent = state.spend_utxo(&utxo.id()).unwrap();
        assert_eq!(spent, utxo);
        assert_eq!(state.utxo(&utxo.id()).unwrap(), None);
        assert!(state.funds(&owner, &Id::EMPTY, 10).unwrap().is_empty());
        assert!(matches!(
            state.spend_utxo(&utxo.id()),
            Err(LedgerError::UnknownUtxo(_))
        ));
    }

    #[test]
    fn funds_pagination_is_exact_once() {
        let state = state();
        let owner = addr(1);
        for tx_byte in 1..=5u8 {
            state.fund_utxo(&utxo(tx_byte, 0, owner)).unwrap();
        }

        // Walk with limit 2, using the last returned id as the next cursor.
        let mut seen = Vec::new();
        let mut cursor = Id::EMPTY;
        loop {
            let page = state.funds(&owner, &cursor, 2).unwrap();
            if page.is_empty() {
                break;
            }
            cursor = *page.last().unwrap();
            seen.extend(page);
        }
        assert_eq!(seen.len(), 5);
        let mut deduped = seen.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), 5, "pagination revisited a utxo");
    }

    #[test]
    fn managed_asset_records_roundtrip() {
        let state = state();
        let asset = Id::from_bytes([3; 32]);
        assert!(state.managed_asset(&asset).unwrap().is_none());

        let record = ManagedAssetRecord {
            last_updated_epoch: 2,
            ..Default::default()
        };
        state.put_managed_asset(&asset, &record).unwrap();
        assert_eq!(state.managed_asset(&asset).unwrap(), Some(record));
    }

    #[test]
    fn writes_are_buffered_until_commit() {
        let base = Arc::new(MemDb::new());
        let state = ChainState::new(base.clone(), CodecManager::new());
        state.set_db_initialized().unwrap();
        assert!(state.db_initialized().unwrap());
        assert!(!base.has(KEY_DB_INITIALIZED).unwrap());

        state.commit().unwrap();
        assert!(base.has(KEY_DB_INITIALIZED).unwrap());
    }
}
