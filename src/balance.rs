/// An AVL balance factor, `height(right) - height(left)`.
///
/// Stored with a bias of one so the three legal values `-1`, `0` and `1` occupy `0..=2`.
#[derive(Copy, Clone, PartialEq, Eq)]
pub(crate) struct Balance(u8);

impl Balance {
    pub(crate) const EVEN: Balance = Balance(1);

    #[inline]
    pub(crate) fn new(factor: i8) -> Balance {
        debug_assert!(
            (-1..=1).contains(&factor),
            "balance factor {factor} out of range"
        );

        Balance((factor + 1) as u8)
    }

    #[inline]
    pub(crate) fn get(self) -> i8 {
        self.0 as i8 - 1
    }

    #[inline]
    pub(crate) fn adjust(&mut self, amount: i8) {
        *self = Balance::new(self.get() + amount);
    }
}

impl core::fmt::Debug for Balance {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(&self.get(), f)
    }
}
