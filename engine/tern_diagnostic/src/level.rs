use bitflags::bitflags;

bitflags! {
    /// Numeric diagnostic levels, combinable into a reporting mask.
    ///
    /// The bit values are stable and visible to scripts through the
    /// `E_*` builtin constants.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct ErrorLevel: u32 {
        const ERROR = 1;
        const WARNING = 1 << 1;
        const PARSE = 1 << 2;
        const NOTICE = 1 << 3;
        const CORE_ERROR = 1 << 4;
        const CORE_WARNING = 1 << 5;
        const COMPILE_ERROR = 1 << 6;
        const COMPILE_WARNING = 1 << 7;
        const USER_ERROR = 1 << 8;
        const USER_WARNING = 1 << 9;
        const USER_NOTICE = 1 << 10;

        const ALL = Self::ERROR.bits()
            | Self::WARNING.bits()
            | Self::PARSE.bits()
            | Self::NOTICE.bits()
            | Self::CORE_ERROR.bits()
            | Self::CORE_WARNING.bits()
            | Self::COMPILE_ERROR.bits()
            | Self::COMPILE_WARNING.bits()
            | Self::USER_ERROR.bits()
            | Self::USER_WARNING.bits()
            | Self::USER_NOTICE.bits();
    }
}

impl ErrorLevel {
    /// Script-visible constant names paired with their level.
    pub const NAMED: [(&'static str, ErrorLevel); 12] = [
        ("E_ERROR", ErrorLevel::ERROR),
        ("E_WARNING", ErrorLevel::WARNING),
        ("E_PARSE", ErrorLevel::PARSE),
        ("E_NOTICE", ErrorLevel::NOTICE),
        ("E_CORE_ERROR", ErrorLevel::CORE_ERROR),
        ("E_CORE_WARNING", ErrorLevel::CORE_WARNING),
        ("E_COMPILE_ERROR", ErrorLevel::COMPILE_ERROR),
        ("E_COMPILE_WARNING", ErrorLevel::COMPILE_WARNING),
        ("E_USER_ERROR", ErrorLevel::USER_ERROR),
        ("E_USER_WARNING", ErrorLevel::USER_WARNING),
        ("E_USER_NOTICE", ErrorLevel::USER_NOTICE),
        ("E_ALL", ErrorLevel::ALL),
    ];
}
