use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};
use serde::de::Visitor;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub struct SharedMemory {
    data: Box<[AtomicU8]>,
}

// Shared between the CPU and the scan-out. Accesses are per-byte atomic;
// a frame may observe a half-written row.
impl SharedMemory {
    pub fn new(len: usize, fill_with: u8) -> Self {
        Self {
            data: (0..len).map(|_| AtomicU8::new(fill_with)).collect(),
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, i: usize) -> u8 {
        self.data[i].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, i: usize, v: u8) {
        self.data[i].store(v, Ordering::Relaxed);
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn fill(&self, v: u8) {
        for b in self.data.iter() {
            b.store(v, Ordering::Relaxed);
        }
    }

    pub fn copy(&self, dest: usize, buf: &[u8]) {
        for (i, v) in buf.iter().enumerate() {
            self.data[dest + i].store(*v, Ordering::Relaxed);
        }
    }
}

impl Serialize for SharedMemory {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.data.len()))?;
        for e in self.data.iter() {
            seq.serialize_element(&e.load(Ordering::Relaxed))?;
        }
        seq.end()
    }
}

struct SharedMemoryVisitor;

impl<'de> Visitor<'de> for SharedMemoryVisitor {
    type Value = SharedMemory;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("struct SharedMemory")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        let mut data = Vec::new();
        while let Some(value) = seq.next_element::<u8>()? {
            data.push(AtomicU8::new(value));
        }
        Ok(SharedMemory {
            data: data.into_boxed_slice(),
        })
    }
}

impl<'de> Deserialize<'de> for SharedMemory {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(SharedMemoryVisitor)
    }
}
