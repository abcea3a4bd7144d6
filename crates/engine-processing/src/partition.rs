use model::core::fingerprint::Fingerprint;

/// The slice of the key space one worker owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioning {
    pub id: usize,
    pub count: usize,
}

impl Partitioning {
    pub fn new(id: usize, count: usize) -> Self {
        Partitioning {
            id,
            count: count.max(1),
        }
    }

    pub fn single() -> Self {
        Partitioning::new(0, 1)
    }

    pub fn owner_of(&self, fingerprint: &Fingerprint) -> usize {
        fingerprint.partition(self.count)
    }

    pub fn owns(&self, fingerprint: &Fingerprint) -> bool {
        self.owner_of(fingerprint) == self.id
    }
}
