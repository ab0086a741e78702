/// A slab of values addressed by generation-checked tokens.
///
/// A `Slab` stores values of type `T` in a contiguous array and hands out
/// `u64` tokens that pack the slot index (low 32 bits) together with the
/// slot's generation (high 32 bits). Removing a value bumps the generation
/// of its slot, so a stale token never resolves to a newer occupant even
/// after the index has been reused.
///
/// Internally, it keeps track of:
/// - occupied slots and their generation,
/// - free indices available for reuse.
pub(crate) struct Slab<T> {
    /// Storage for entries.
    slots: Vec<Slot<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<u32>,
    /// Number of occupied slots.
    len: usize,
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with room for `size` entries before growing.
    ///
    /// # Arguments
    ///
    /// * `size` - Initial number of slots to allocate.
    pub(crate) fn new(size: usize) -> Self {
        Self {
            slots: Vec::with_capacity(size),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Inserts a value and returns its token.
    ///
    /// If a free slot is available, it is reused with its current generation.
    pub(crate) fn insert(&mut self, value: T) -> u64 {
        let index = match self.free.pop() {
            Some(i) => i,
            None => {
                let i = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
                assert!(i < u32::MAX, "slab is full");

                self.slots.push(Slot {
                    generation: 1,
                    value: None,
                });
                i
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        self.len += 1;

        token(slot.generation, index)
    }

    /// Returns the value behind `token`, if it is still live.
    pub(crate) fn get(&self, token: u64) -> Option<&T> {
        let (generation, index) = split(token);

        self.slots
            .get(index as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Removes and returns the value behind `token`.
    ///
    /// Returns `None` when the token is stale or was never issued. The slot
    /// becomes free and its generation moves on.
    pub(crate) fn remove(&mut self, token: u64) -> Option<T> {
        let (generation, index) = split(token);

        let slot = self.slots.get_mut(index as usize)?;
        if slot.generation != generation {
            return None;
        }

        let value = slot.value.take()?;

        // Generations 0 and u32::MAX are never issued, which keeps every
        // token distinct from the poller's wake token.
        slot.generation = match slot.generation.wrapping_add(1) {
            0 | u32::MAX => 1,
            g => g,
        };
        self.free.push(index);
        self.len -= 1;

        Some(value)
    }

    /// Number of live entries.
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

fn token(generation: u32, index: u32) -> u64 {
    ((generation as u64) << 32) | index as u64
}

fn split(token: u64) -> (u32, u32) {
    ((token >> 32) as u32, token as u32)
}
