//! Charge estimation for tensor bindings.

use super::amount::ChargeAmount;

/// Flat charge for constant-time element access.
pub const LOW_CHARGE: u64 = 1;

/// Charge per tensor element for size-proportional operations.
pub const CHARGE_UNIT: u64 = 1;

/// Characters per element assumed when parsing a tensor from text.
const TEXT_CHARS_PER_VALUE: u64 = 2;

/// Prices operations on one tensor of a known shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorEstimator {
    shape: Vec<u64>,
}

impl TensorEstimator {
    pub fn new(shape: Vec<u64>) -> Self {
        Self { shape }
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Element count, saturating. An empty shape has no elements.
    pub fn element_count(&self) -> u64 {
        if self.shape.is_empty() {
            return 0;
        }
        self.shape.iter().fold(1u64, |acc, &d| acc.saturating_mul(d))
    }

    fn charge_of_size(&self, factor: u64) -> ChargeAmount {
        ChargeAmount(CHARGE_UNIT)
            .saturating_mul(factor)
            .saturating_mul(self.element_count())
    }

    pub fn size(&self) -> ChargeAmount {
        ChargeAmount(LOW_CHARGE)
    }

    pub fn at(&self, _indices: &[u64]) -> ChargeAmount {
        ChargeAmount(LOW_CHARGE)
    }

    pub fn set_at(&self, _indices: &[u64]) -> ChargeAmount {
        ChargeAmount(LOW_CHARGE)
    }

    pub fn fill(&self) -> ChargeAmount {
        self.charge_of_size(1)
    }

    pub fn fill_random(&self) -> ChargeAmount {
        self.charge_of_size(1)
    }

    pub fn squeeze(&self) -> ChargeAmount {
        self.charge_of_size(1)
    }

    pub fn unsqueeze(&self) -> ChargeAmount {
        self.charge_of_size(1)
    }

    /// Reshaping copies the current contents, so it is priced on the
    /// current size regardless of `new_shape`.
    pub fn reshape(&self, _new_shape: &[u64]) -> ChargeAmount {
        self.charge_of_size(1)
    }

    pub fn transpose(&self) -> ChargeAmount {
        self.charge_of_size(1)
    }

    pub fn from_text(&self, text: &str) -> ChargeAmount {
        ChargeAmount(text.len() as u64 / TEXT_CHARS_PER_VALUE)
    }

    pub fn to_text(&self) -> ChargeAmount {
        self.charge_of_size(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_access_is_flat() {
        let small = TensorEstimator::new(vec![2]);
        let large = TensorEstimator::new(vec![1000, 1000]);
        assert_eq!(small.at(&[0]), large.at(&[999, 999]));
        assert_eq!(large.set_at(&[1, 1]), ChargeAmount(LOW_CHARGE));
        assert_eq!(large.size(), ChargeAmount(LOW_CHARGE));
    }

    #[test]
    fn test_size_proportional() {
        let t = TensorEstimator::new(vec![3, 4, 5]);
        assert_eq!(t.element_count(), 60);
        assert_eq!(t.fill(), ChargeAmount(60));
        assert_eq!(t.reshape(&[60]), ChargeAmount(60));
        assert_eq!(t.transpose(), ChargeAmount(60));
        assert_eq!(t.to_text(), ChargeAmount(60));
    }

    #[test]
    fn test_from_text_is_half_length() {
        let t = TensorEstimator::new(vec![]);
        assert_eq!(t.from_text("1,2,3,4"), ChargeAmount(3));
        assert_eq!(t.from_text(""), ChargeAmount::ZERO);
        assert_eq!(t.fill(), ChargeAmount::ZERO);
    }

    #[test]
    fn test_huge_tensor_saturates() {
        let t = TensorEstimator::new(vec![u64::MAX, 2]);
        assert!(t.fill().is_max());
    }
}
