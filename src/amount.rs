use std::fmt;

/// Fixed-point decimal with 4 decimal places, stored as a scaled integer.
///
/// All wallet balances and prize amounts use this type. Proportional splits
/// truncate toward zero so a sum of shares never exceeds the whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Amount(i64);

impl Amount {
    const SCALE: i64 = 10_000;

    pub const ZERO: Amount = Amount(0);

    pub fn from_float(value: f64) -> Self {
        Amount((value * Self::SCALE as f64).round() as i64)
    }

    pub const fn from_scaled(value: i64) -> Self {
        Amount(value)
    }

    pub const fn as_scaled(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Truncating proportional share: `self * num / den`.
    ///
    /// Intermediate math in i128 so large pools cannot overflow.
    pub fn ratio(self, num: u64, den: u64) -> Self {
        debug_assert!(den > 0);
        Amount((self.0 as i128 * num as i128 / den as i128) as i64)
    }

    /// Truncating division into `parts` equal shares.
    pub fn split(self, parts: u64) -> Self {
        self.ratio(1, parts)
    }

    /// This amount as a rounded integer percentage of `total`.
    pub fn percent_of(self, total: Amount) -> u32 {
        if total.0 <= 0 {
            return 0;
        }
        let num = self.0 as i128 * 100;
        let den = total.0 as i128;
        // round half up
        ((num + den / 2) / den).max(0) as u32
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        let whole = abs / Self::SCALE;
        let frac = abs % Self::SCALE;
        write!(f, "{sign}{whole}.{frac:04}")
    }
}

impl std::ops::Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount(self.0 - rhs.0)
    }
}

impl std::ops::Mul<u64> for Amount {
    type Output = Self;

    fn mul(self, rhs: u64) -> Self::Output {
        Amount((self.0 as i128 * rhs as i128) as i64)
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}
