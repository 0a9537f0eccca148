use crate::commitlog::{Entry, Index, Log};
use std::collections::VecDeque;
use std::io;
use std::marker::PhantomData;

// The log is modeled in memory; a durable log only needs to implement the `Log` trait.
pub struct InMemoryLog<E: Entry> {
    // We don't *need* to convert these to bytes. We could just hold the original entry in memory,
    // but we want to exercise the conversion logic.
    log: VecDeque<Vec<u8>>,
    // Index of `log[0]`.
    first_index: Index,
    _pd: PhantomData<E>,
}

impl<E: Entry> InMemoryLog<E> {
    pub fn create() -> Result<Self, io::Error> {
        Ok(InMemoryLog {
            log: VecDeque::new(),
            first_index: Index::start_index(),
            _pd: PhantomData::default(),
        })
    }

    fn vec_index(&self, index: Index) -> Option<usize> {
        index
            .as_u64()
            .checked_sub(self.first_index.as_u64())
            .map(|offset| offset as usize)
    }
}

impl<E: Entry> Log<E> for InMemoryLog<E> {
    fn append(&mut self, entry: E) -> Result<Index, io::Error> {
        let index = self.next_index();
        self.log.push_back(entry.encode()?);

        Ok(index)
    }

    fn read(&self, index: Index) -> Result<Option<E>, io::Error> {
        match self.vec_index(index).and_then(|i| self.log.get(i)) {
            Some(bytes) => E::decode(bytes).map(Some),
            None => Ok(None),
        }
    }

    fn truncate(&mut self, index: Index) {
        let keep = self.vec_index(index).unwrap_or(0);
        self.log.truncate(keep)
    }

    fn next_index(&self) -> Index {
        self.first_index.plus(self.log.len() as u64)
    }

    fn first_index(&self) -> Index {
        self.first_index
    }

    fn compact(&mut self, index: Index) {
        if index < self.first_index {
            return;
        }
        let drop = (index.as_u64() - self.first_index.as_u64() + 1) as usize;
        if drop >= self.log.len() {
            let next = self.next_index().max(index.plus(1));
            self.reset(next);
        } else {
            self.log.drain(..drop);
            self.first_index = index.plus(1);
        }
    }

    fn reset(&mut self, next_index: Index) {
        self.log.clear();
        self.first_index = next_index;
    }
}
