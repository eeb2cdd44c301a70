use std::fmt;
use std::marker::PhantomData;

/// An enum usable as a member of [`EnumSet`]: at most 32 variants with
/// discriminants `0..32`.
pub trait SetMember: Copy + Into<u8> + TryFrom<u8> {}

impl<T: Copy + Into<u8> + TryFrom<u8>> SetMember for T {}

/// A compact set of fieldless enum values, stored as a bitmask.
pub struct EnumSet<E> {
    bits: u32,
    _marker: PhantomData<E>,
}

impl<E: SetMember> EnumSet<E> {
    pub const fn empty() -> Self {
        Self {
            bits: 0,
            _marker: PhantomData,
        }
    }

    pub fn of(members: impl IntoIterator<Item = E>) -> Self {
        let mut set = Self::empty();
        for m in members {
            set.insert(m);
        }
        set
    }

    fn bit(member: E) -> u32 {
        1u32 << member.into()
    }

    pub fn insert(&mut self, member: E) {
        self.bits |= Self::bit(member);
    }

    pub fn remove(&mut self, member: E) {
        self.bits &= !Self::bit(member);
    }

    pub fn with(mut self, member: E) -> Self {
        self.insert(member);
        self
    }

    pub fn contains(&self, member: E) -> bool {
        self.bits & Self::bit(member) != 0
    }

    pub fn contains_all(&self, other: &Self) -> bool {
        self.bits & other.bits == other.bits
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            bits: self.bits | other.bits,
            _marker: PhantomData,
        }
    }

    pub fn difference(&self, other: &Self) -> Self {
        Self {
            bits: self.bits & !other.bits,
            _marker: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// Members in ascending discriminant order.
    pub fn iter(&self) -> impl Iterator<Item = E> + '_ {
        (0u8..32)
            .filter(move |i| self.bits & (1u32 << i) != 0)
            .filter_map(|i| E::try_from(i).ok())
    }
}

impl<E> Clone for EnumSet<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for EnumSet<E> {}

impl<E> PartialEq for EnumSet<E> {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<E> Eq for EnumSet<E> {}

impl<E> std::hash::Hash for EnumSet<E> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
    }
}

impl<E: SetMember> Default for EnumSet<E> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<E: SetMember> FromIterator<E> for EnumSet<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self::of(iter)
    }
}

impl<E: SetMember + fmt::Debug> fmt::Debug for EnumSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
