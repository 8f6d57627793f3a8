//! Command status lattices.
//!
//! Each AECP flavor and ACMP has its own status code space: the 5-bit
//! on-wire codes of IEEE 1722.1 (or Milan), extended with library overlay
//! codes in the 994..=999 range for conditions that never appear on the
//! wire (timeouts, transport failures, aborted commands).
//!
//! The `combine` helpers fold several statuses with a first-non-success
//! wins policy, used when one logical operation issues several commands.

use crate::error::Error;

/// Status of an AEM (AECP) command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum AemCommandStatus {
    // AVDECC protocol codes
    Success = 0,
    NotImplemented = 1,
    NoSuchDescriptor = 2,
    LockedByOther = 3,
    AcquiredByOther = 4,
    NotAuthenticated = 5,
    AuthenticationDisabled = 6,
    BadArguments = 7,
    NoResources = 8,
    InProgress = 9,
    EntityMisbehaving = 10,
    NotSupported = 11,
    StreamIsRunning = 12,
    // Library overlay codes
    NetworkError = 995,
    ProtocolError = 996,
    TimedOut = 997,
    UnknownEntity = 998,
    InternalError = 999,
}

impl AemCommandStatus {
    /// Decode the 5-bit status field of an AEM response.
    pub fn from_wire(value: u8) -> Self {
        match value {
            0 => Self::Success,
            1 => Self::NotImplemented,
            2 => Self::NoSuchDescriptor,
            3 => Self::LockedByOther,
            4 => Self::AcquiredByOther,
            5 => Self::NotAuthenticated,
            6 => Self::AuthenticationDisabled,
            7 => Self::BadArguments,
            8 => Self::NoResources,
            9 => Self::InProgress,
            10 => Self::EntityMisbehaving,
            11 => Self::NotSupported,
            12 => Self::StreamIsRunning,
            _ => Self::InternalError,
        }
    }

    /// Translate a failed engine command into this lattice.
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::Timeout => Self::TimedOut,
            Error::TransportError | Error::Io(_) | Error::EngineShutDown => Self::NetworkError,
            Error::UnknownRemoteEntity | Error::UnknownLocalEntity => Self::UnknownEntity,
            Error::MessageNotSupported => Self::NotImplemented,
            _ => Self::InternalError,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Status of an Address Access (AECP) command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum AaCommandStatus {
    // AVDECC protocol codes
    Success = 0,
    NotImplemented = 1,
    AddressTooLow = 2,
    AddressTooHigh = 3,
    AddressInvalid = 4,
    TlvInvalid = 5,
    DataInvalid = 6,
    Unsupported = 7,
    // Library overlay codes
    Aborted = 994,
    NetworkError = 995,
    ProtocolError = 996,
    TimedOut = 997,
    UnknownEntity = 998,
    InternalError = 999,
}

impl AaCommandStatus {
    pub fn from_wire(value: u8) -> Self {
        match value {
            0 => Self::Success,
            1 => Self::NotImplemented,
            2 => Self::AddressTooLow,
            3 => Self::AddressTooHigh,
            4 => Self::AddressInvalid,
            5 => Self::TlvInvalid,
            6 => Self::DataInvalid,
            7 => Self::Unsupported,
            _ => Self::InternalError,
        }
    }

    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::Timeout => Self::TimedOut,
            Error::EngineShutDown => Self::Aborted,
            Error::TransportError | Error::Io(_) => Self::NetworkError,
            Error::UnknownRemoteEntity | Error::UnknownLocalEntity => Self::UnknownEntity,
            _ => Self::InternalError,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Status of a Milan Vendor Unique (AECP) command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MvuCommandStatus {
    // Milan protocol codes
    Success = 0,
    NotImplemented = 1,
    BadArguments = 2,
    // Library overlay codes
    NetworkError = 995,
    ProtocolError = 996,
    TimedOut = 997,
    UnknownEntity = 998,
    InternalError = 999,
}

impl MvuCommandStatus {
    pub fn from_wire(value: u8) -> Self {
        match value {
            0 => Self::Success,
            1 => Self::NotImplemented,
            2 => Self::BadArguments,
            _ => Self::InternalError,
        }
    }

    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::Timeout => Self::TimedOut,
            Error::TransportError | Error::Io(_) | Error::EngineShutDown => Self::NetworkError,
            Error::UnknownRemoteEntity | Error::UnknownLocalEntity => Self::UnknownEntity,
            _ => Self::InternalError,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Status of an ACMP operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum AcmpStatus {
    // AVDECC protocol codes
    Success = 0,
    ListenerUnknownID = 1,
    TalkerUnknownID = 2,
    TalkerDestMacFail = 3,
    TalkerNoStreamIndex = 4,
    TalkerNoBandwidth = 5,
    TalkerExclusive = 6,
    ListenerTalkerTimeout = 7,
    ListenerExclusive = 8,
    StateUnavailable = 9,
    NotConnected = 10,
    NoSuchConnection = 11,
    CouldNotSendMessage = 12,
    TalkerMisbehaving = 13,
    ListenerMisbehaving = 14,
    ControllerNotAuthorized = 16,
    IncompatibleRequest = 17,
    NotSupported = 31,
    // Library overlay codes
    NetworkError = 995,
    ProtocolError = 996,
    TimedOut = 997,
    UnknownEntity = 998,
    InternalError = 999,
}

impl AcmpStatus {
    /// Decode the 5-bit status field of an ACMP response.
    pub fn from_wire(value: u8) -> Self {
        match value {
            0 => Self::Success,
            1 => Self::ListenerUnknownID,
            2 => Self::TalkerUnknownID,
            3 => Self::TalkerDestMacFail,
            4 => Self::TalkerNoStreamIndex,
            5 => Self::TalkerNoBandwidth,
            6 => Self::TalkerExclusive,
            7 => Self::ListenerTalkerTimeout,
            8 => Self::ListenerExclusive,
            9 => Self::StateUnavailable,
            10 => Self::NotConnected,
            11 => Self::NoSuchConnection,
            12 => Self::CouldNotSendMessage,
            13 => Self::TalkerMisbehaving,
            14 => Self::ListenerMisbehaving,
            16 => Self::ControllerNotAuthorized,
            17 => Self::IncompatibleRequest,
            31 => Self::NotSupported,
            _ => Self::InternalError,
        }
    }

    pub fn to_wire(&self) -> u8 {
        let raw = *self as u16;
        if raw <= 31 {
            raw as u8
        } else {
            Self::NotSupported as u8
        }
    }

    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::Timeout => Self::TimedOut,
            Error::TransportError | Error::Io(_) | Error::EngineShutDown => Self::NetworkError,
            Error::UnknownRemoteEntity | Error::UnknownLocalEntity => Self::UnknownEntity,
            _ => Self::InternalError,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

// ============================================================================
// COMBINATORS
// ============================================================================

/// Fold two AEM statuses: the first non-success wins.
pub fn combine_aem(lhs: AemCommandStatus, rhs: AemCommandStatus) -> AemCommandStatus {
    if lhs.is_success() {
        rhs
    } else {
        lhs
    }
}

/// Fold two AA statuses: the first non-success wins.
pub fn combine_aa(lhs: AaCommandStatus, rhs: AaCommandStatus) -> AaCommandStatus {
    if lhs.is_success() {
        rhs
    } else {
        lhs
    }
}

/// Fold two MVU statuses: the first non-success wins.
pub fn combine_mvu(lhs: MvuCommandStatus, rhs: MvuCommandStatus) -> MvuCommandStatus {
    if lhs.is_success() {
        rhs
    } else {
        lhs
    }
}

/// Fold two ACMP statuses: the first non-success wins.
pub fn combine_acmp(lhs: AcmpStatus, rhs: AcmpStatus) -> AcmpStatus {
    if lhs.is_success() {
        rhs
    } else {
        lhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn aem_wire_codes_round_trip() {
        for raw in 0..=12u8 {
            let status = AemCommandStatus::from_wire(raw);
            assert_eq!(status as u16, raw as u16);
        }
        // Reserved wire values collapse to InternalError
        assert_eq!(
            AemCommandStatus::from_wire(13),
            AemCommandStatus::InternalError
        );
    }

    #[test_log::test]
    fn acmp_wire_codes_skip_reserved_ranges() {
        assert_eq!(AcmpStatus::from_wire(15), AcmpStatus::InternalError);
        assert_eq!(AcmpStatus::from_wire(18), AcmpStatus::InternalError);
        assert_eq!(AcmpStatus::from_wire(31), AcmpStatus::NotSupported);
        assert_eq!(AcmpStatus::NotSupported.to_wire(), 31);
        assert_eq!(AcmpStatus::ListenerExclusive.to_wire(), 8);
    }

    #[test_log::test]
    fn combine_first_non_success_wins() {
        use AemCommandStatus::*;
        assert_eq!(combine_aem(Success, Success), Success);
        assert_eq!(combine_aem(Success, TimedOut), TimedOut);
        assert_eq!(combine_aem(NoSuchDescriptor, TimedOut), NoSuchDescriptor);
        assert_eq!(combine_aem(TimedOut, Success), TimedOut);
    }

    #[test_log::test]
    fn error_translation_picks_overlay_codes() {
        assert_eq!(
            AemCommandStatus::from_error(&Error::Timeout),
            AemCommandStatus::TimedOut
        );
        assert_eq!(
            AaCommandStatus::from_error(&Error::EngineShutDown),
            AaCommandStatus::Aborted
        );
        assert_eq!(
            AcmpStatus::from_error(&Error::TransportError),
            AcmpStatus::NetworkError
        );
        assert_eq!(
            MvuCommandStatus::from_error(&Error::UnknownRemoteEntity),
            MvuCommandStatus::UnknownEntity
        );
    }
}
