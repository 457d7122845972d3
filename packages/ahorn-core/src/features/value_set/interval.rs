//! Interval domain

/// Closed interval over i64, clamped to the i32 value range at the
/// top element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbstractInterval {
    pub lo: i64,
    pub hi: i64,
}

impl AbstractInterval {
    pub const TOP: AbstractInterval = AbstractInterval {
        lo: i32::MIN as i64,
        hi: i32::MAX as i64,
    };

    pub fn constant(value: i64) -> Self {
        Self { lo: value, hi: value }
    }

    pub fn new(lo: i64, hi: i64) -> Self {
        Self { lo, hi }
    }

    pub fn is_empty(&self) -> bool {
        self.lo > self.hi
    }

    pub fn contains(&self, value: i64) -> bool {
        self.lo <= value && value <= self.hi
    }

    pub fn join(&self, other: &Self) -> Self {
        Self {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }

    pub fn meet(&self, other: &Self) -> Self {
        Self {
            lo: self.lo.max(other.lo),
            hi: self.hi.min(other.hi),
        }
    }

    /// Widening: any bound that grew jumps to the respective extreme
    pub fn widen(&self, next: &Self) -> Self {
        Self {
            lo: if next.lo < self.lo {
                AbstractInterval::TOP.lo
            } else {
                self.lo
            },
            hi: if next.hi > self.hi {
                AbstractInterval::TOP.hi
            } else {
                self.hi
            },
        }
    }

    pub fn add(&self, other: &Self) -> Self {
        Self {
            lo: self.lo.saturating_add(other.lo).max(Self::TOP.lo),
            hi: self.hi.saturating_add(other.hi).min(Self::TOP.hi),
        }
    }

    pub fn sub(&self, other: &Self) -> Self {
        Self {
            lo: self.lo.saturating_sub(other.hi).max(Self::TOP.lo),
            hi: self.hi.saturating_sub(other.lo).min(Self::TOP.hi),
        }
    }

    pub fn neg(&self) -> Self {
        Self {
            lo: -self.hi,
            hi: -self.lo,
        }
    }

    pub fn mul(&self, other: &Self) -> Self {
        let corners = [
            self.lo.saturating_mul(other.lo),
            self.lo.saturating_mul(other.hi),
            self.hi.saturating_mul(other.lo),
            self.hi.saturating_mul(other.hi),
        ];
        Self {
            lo: (*corners.iter().min().unwrap()).max(Self::TOP.lo),
            hi: (*corners.iter().max().unwrap()).min(Self::TOP.hi),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_meet() {
        let a = AbstractInterval::new(0, 5);
        let b = AbstractInterval::new(3, 10);
        assert_eq!(a.join(&b), AbstractInterval::new(0, 10));
        assert_eq!(a.meet(&b), AbstractInterval::new(3, 5));
        assert!(a.meet(&AbstractInterval::new(7, 9)).is_empty());
    }

    #[test]
    fn test_widen_goes_to_top() {
        let a = AbstractInterval::new(0, 5);
        let grown = AbstractInterval::new(0, 6);
        assert_eq!(a.widen(&grown).hi, AbstractInterval::TOP.hi);
        assert_eq!(a.widen(&grown).lo, 0);
    }

    #[test]
    fn test_arithmetic() {
        let a = AbstractInterval::new(1, 2);
        let b = AbstractInterval::new(-3, 4);
        assert_eq!(a.add(&b), AbstractInterval::new(-2, 6));
        assert_eq!(a.mul(&b), AbstractInterval::new(-6, 8));
    }
}
