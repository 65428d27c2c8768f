use super::ImageMode;

/// What to do with the session after a delivered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    /// The mode's frame count has been reached.
    Complete,
    /// The configured mode code is not a known image mode.
    InvalidMode(i64),
}

/// Decide whether the session ends after `delivered` frames.
pub fn evaluate(mode_code: i64, delivered: u64, target: u64) -> Verdict {
    match ImageMode::from_code(mode_code) {
        Some(ImageMode::Single) if delivered >= 1 => Verdict::Complete,
        Some(ImageMode::Multiple) if delivered >= target => Verdict::Complete,
        Some(_) => Verdict::Continue,
        None => Verdict::InvalidMode(mode_code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_completes_after_first_frame() {
        assert_eq!(evaluate(0, 0, 1), Verdict::Continue);
        assert_eq!(evaluate(0, 1, 1), Verdict::Complete);
    }

    #[test]
    fn multiple_completes_at_target() {
        assert_eq!(evaluate(1, 4, 5), Verdict::Continue);
        assert_eq!(evaluate(1, 5, 5), Verdict::Complete);
    }

    #[test]
    fn continuous_never_completes() {
        assert_eq!(evaluate(2, u64::MAX, 1), Verdict::Continue);
    }

    #[test]
    fn unknown_mode_is_reported() {
        assert_eq!(evaluate(7, 1, 1), Verdict::InvalidMode(7));
    }
}
