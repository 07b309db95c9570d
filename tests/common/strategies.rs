use proptest::prelude::*;

/// Which of the four recording worker slots a launch registers
pub fn registration_mask_strategy() -> impl Strategy<Value = [bool; 4]> {
    any::<[bool; 4]>()
}
