//! Rate boundary sampling.

/// Precision of the boundary: rates are honoured to four decimal places.
const BOUNDARY_SCALE: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("sample rate {0} must be within [0, 1]")]
pub struct SampleRateError(pub f64);

/// Decides whether a new root trace is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sampler {
    Always,
    Never,
    /// Samples ids whose salted value falls below `boundary` out of 10000.
    Boundary { boundary: u64, salt: u64 },
}

impl Sampler {
    pub fn boundary(rate: f64, salt: u64) -> Result<Self, SampleRateError> {
        if !(0.0..=1.0).contains(&rate) || rate.is_nan() {
            return Err(SampleRateError(rate));
        }
        if rate == 0.0 {
            return Ok(Sampler::Never);
        }
        if rate == 1.0 {
            return Ok(Sampler::Always);
        }
        Ok(Sampler::Boundary {
            boundary: (rate * BOUNDARY_SCALE) as u64,
            salt,
        })
    }

    pub fn sample(&self, id: u64) -> bool {
        match *self {
            Sampler::Always => true,
            Sampler::Never => false,
            Sampler::Boundary { boundary, salt } => (id ^ salt) % (BOUNDARY_SCALE as u64) < boundary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges() {
        assert_eq!(Sampler::boundary(0.0, 7).unwrap(), Sampler::Never);
        assert_eq!(Sampler::boundary(1.0, 7).unwrap(), Sampler::Always);
        assert!(Sampler::boundary(1.5, 7).is_err());
        assert!(Sampler::boundary(-0.1, 7).is_err());
        assert!(Sampler::boundary(f64::NAN, 7).is_err());
    }

    #[test]
    fn test_half_rate() {
        let sampler = Sampler::boundary(0.5, 0).unwrap();
        let kept = (0..10_000u64).filter(|id| sampler.sample(*id)).count();
        assert_eq!(kept, 5_000);
    }
}
