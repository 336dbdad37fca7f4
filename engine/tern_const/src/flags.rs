use bitflags::bitflags;

bitflags! {
    /// Registration flags of a constant.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct ConstFlags: u8 {
        /// Survives request end; lives in the shared half.
        const PERSISTENT = 1 << 0;
        /// Only the exact spelling matches.
        const CASE_SENSITIVE = 1 << 1;
    }
}
