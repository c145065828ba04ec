//! Key-prefixed database view.

use std::sync::Arc;

use crate::{
    Batch, Batcher, Database, DbIterator, Iteratee, KeyValueDeleter, KeyValueReader,
    KeyValueWriter, Result,
};

/// A namespaced view over another database: every key is stored under
/// `prefix || key`. Iterators yield keys with the prefix stripped.
pub struct PrefixDb {
    db: Arc<dyn Database>,
    prefix: Vec<u8>,
}

impl PrefixDb {
    pub fn new(db: Arc<dyn Database>, prefix: &[u8]) -> Self {
        Self {
            db,
            prefix: prefix.to_vec(),
        }
    }

    fn wrap(&self, key: &[u8]) -> Vec<u8> {
        let mut wrapped = Vec::with_capacity(self.prefix.len() + key.len());
        wrapped.extend_from_slice(&self.prefix);
        wrapped.extend_from_slice(key);
        wrapped
    }
}

impl KeyValueReader for PrefixDb {
    fn has(&self, key: &[u8]) -> Result<bool> {
        self.db.has(&self.wrap(key))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db.get(&self.wrap(key))
    }
}

impl KeyValueWriter for PrefixDb {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(&self.wrap(key), value)
    }
}

impl KeyValueDeleter for PrefixDb {
    fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.delete(&self.wrap(key))
    }
}

impl Iteratee for PrefixDb {
    fn new_iterator(&self) -> Box<dyn DbIterator> {
        Box::new(StripIterator {
            inner: self.db.new_iterator_with_prefix(&self.prefix),
            strip: self.prefix.len(),
        })
    }

    fn new_iterator_with_start(&self, start: &[u8]) -> Box<dyn DbIterator> {
        // Starting inside the namespace still has to stay inside it, so the
        // underlying iterator is prefix-bounded and skipped forward.
        let wrapped_start = self.wrap(start);
        Box::new(BoundedStripIterator {
            inner: self.db.new_iterator_with_start(&wrapped_start),
            prefix: self.prefix.clone(),
        })
    }

    fn new_iterator_with_prefix(&self, prefix: &[u8]) -> Box<dyn DbIterator> {
        Box::new(StripIterator {
            inner: self.db.new_iterator_with_prefix(&self.wrap(prefix)),
            strip: self.prefix.len(),
        })
    }
}

impl Batcher for PrefixDb {
    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(PrefixBatch {
            inner: self.db.new_batch(),
            prefix: self.prefix.clone(),
        })
    }
}

impl Database for PrefixDb {
    fn close(&self) -> Result<()> {
        self.db.close()
    }

    fn is_closed(&self) -> bool {
        self.db.is_closed()
    }
}

struct PrefixBatch {
    inner: Box<dyn Batch>,
    prefix: Vec<u8>,
}

impl PrefixBatch {
    fn wrap(&self, key: &[u8]) -> Vec<u8> {
        let mut wrapped = Vec::with_capacity(self.prefix.len() + key.len());
        wrapped.extend_from_slice(&self.prefix);
        wrapped.extend_from_slice(key);
        wrapped
    }
}

impl KeyValueWriter for PrefixBatch {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.put(&self.wrap(key), value)
    }
}

impl KeyValueDeleter for PrefixBatch {
    fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.delete(&self.wrap(key))
    }
}

impl Batch for PrefixBatch {
    fn size(&self) -> usize {
        self.inner.size()
    }

    fn write(&mut self) -> Result<()> {
        self.inner.write()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

struct StripIterator {
    inner: Box<dyn DbIterator>,
    strip: usize,
}

impl DbIterator for StripIterator {
    fn next(&mut self) -> bool {
        self.inner.next()
    }

    fn key(&self) -> &[u8] {
        let key = self.inner.key();
        if key.len() >= self.strip {
            &key[self.strip..]
        } else {
            &[]
        }
    }

    fn value(&self) -> &[u8] {
        self.inner.value()
    }

    fn release(&mut self) {
        self.inner.release();
    }
}

struct BoundedStripIterator {
    inner: Box<dyn DbIterator>,
    prefix: Vec<u8>,
}

impl DbIterator for BoundedStripIterator {
    fn next(&mut self) -> bool {
        self.inner.next() && self.inner.key().starts_with(&self.prefix)
    }

    fn key(&self) -> &[u8] {
        let key = self.inner.key();
        if key.starts_with(&self.prefix) {
            &key[self.prefix.len()..]
        } else {
            &[]
        }
    }

    fn value(&self) -> &[u8] {
        self.inner.value()
    }

    fn release(&mut self) {
        self.inner.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemDb;

    #[test]
    fn keys_are_namespaced() {
        let base = Arc::new(MemDb::new());
        let a = PrefixDb::new(base.clone(), b"a");
        let b = PrefixDb::new(base.clone(), b"b");

        a.put(b"k", b"1").unwrap();
        b.put(b"k", b"2").unwrap();

        assert_eq!(a.get(b"k").unwrap(), Some(b"1".to_vec()));
        assert_eq!(b.get(b"k").unwrap(), Some(b"2".to_vec()));
        assert_eq!(base.get(b"ak").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn iterator_strips_prefix_and_bounds() {
        let base = Arc::new(MemDb::new());
        base.put(b"zz", b"other").unwrap();
        let db = PrefixDb::new(base, b"p");
        db.put(b"a", b"1").unwrap();
        db.put(b"b", b"2").unwrap();

        let mut iter = db.new_iterator();
        let mut keys = Vec::new();
        while iter.next() {
            keys.push(iter.key().to_vec());
        }
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);

        let mut iter = db.new_iterator_with_start(b"b");
        let mut keys = Vec::new();
        while iter.next() {
            keys.push(iter.key().to_vec());
        }
        assert_eq!(keys, vec![b"b".to_vec()]);
    }
}
