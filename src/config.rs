//! # Engine Configuration
//!
//! Construction-time configuration for the protocol engine.
//!
//! Most deployments work with the defaults:
//!
//! ```
//! use avdecc_runtime::EngineConfig;
//!
//! let config = EngineConfig::default();
//! ```
//!
//! ## Builder Pattern
//!
//! ```
//! use avdecc_runtime::EngineConfig;
//!
//! let config = EngineConfig::builder()
//!     .ignore_invalid_control_data_length(true)
//!     .allow_recv_big_aecp_payloads(true)
//!     .build();
//! ```
//!
//! ## Conformance toggles
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `ignore_invalid_control_data_length` | false | Relax the CDL check on receive |
//! | `allow_recv_big_aecp_payloads` | false | Accept AECPDUs above 524 bytes |
//! | `allow_send_big_aecp_payloads` | false | Emit AECPDUs above 524 bytes |
//! | `ignore_invalid_non_success_aem_responses` | false | Keep AEM responses with a malformed payload when status is not Success |
//! | `feature_redundancy` | false | Advertise Milan redundant-stream support |
//!
//! These are the only supported deviations from strict 1722.1; every
//! other nonconformity on the wire is rejected.

use std::collections::HashMap;
use std::time::Duration;

use crate::wire::{AcmpMessageType, MilanInfo};

/// Default per-attempt command timeout (IEEE 1722.1 §9.2.1: 250 ms).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(250);

/// Default total send attempts per command (initial send + retransmissions).
pub const DEFAULT_COMMAND_ATTEMPTS: u8 = 3;

/// Interval of the discovery expiry scan.
pub const EXPIRY_SCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Relax the control_data_length check on the receive path only.
    pub ignore_invalid_control_data_length: bool,
    /// Accept inbound AECPDUs larger than the 524-byte IEEE limit.
    pub allow_recv_big_aecp_payloads: bool,
    /// Emit outbound AECPDUs larger than the 524-byte IEEE limit.
    pub allow_send_big_aecp_payloads: bool,
    /// Keep AEM responses whose payload does not parse when their status
    /// is already a failure code.
    pub ignore_invalid_non_success_aem_responses: bool,
    /// Advertise Milan redundant-stream support in MilanInfo features.
    pub feature_redundancy: bool,
    /// Per-attempt retransmission interval. `None` uses the 1722.1
    /// default of 250 ms.
    pub command_timeout: Option<Duration>,
    /// Total attempts per command. `None` uses the default of 3.
    pub command_attempts: Option<u8>,
    /// Per-message-type ACMP timeout overrides (1722.1 Table 8.3).
    /// Message types without an entry use `command_timeout`.
    pub acmp_timeout_overrides: HashMap<AcmpMessageType, Duration>,
}

impl EngineConfig {
    /// Create a new builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub(crate) fn effective_command_timeout(&self) -> Duration {
        self.command_timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT)
    }

    pub(crate) fn effective_command_attempts(&self) -> u8 {
        self.command_attempts.unwrap_or(DEFAULT_COMMAND_ATTEMPTS).max(1)
    }

    pub(crate) fn acmp_timeout(&self, message_type: AcmpMessageType) -> Duration {
        self.acmp_timeout_overrides
            .get(&message_type)
            .copied()
            .unwrap_or_else(|| self.effective_command_timeout())
    }

    /// The MilanInfo body a local entity advertises when answering
    /// GET_MILAN_INFO, with the redundancy feature bit reflecting this
    /// configuration.
    pub fn milan_info(&self) -> MilanInfo {
        MilanInfo {
            protocol_version: 1,
            features_flags: if self.feature_redundancy {
                MilanInfo::FEATURE_REDUNDANCY
            } else {
                0
            },
            certification_version: 0,
        }
    }
}

/// Builder for [`EngineConfig`]
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn ignore_invalid_control_data_length(mut self, ignore: bool) -> Self {
        self.config.ignore_invalid_control_data_length = ignore;
        self
    }

    pub fn allow_recv_big_aecp_payloads(mut self, allow: bool) -> Self {
        self.config.allow_recv_big_aecp_payloads = allow;
        self
    }

    pub fn allow_send_big_aecp_payloads(mut self, allow: bool) -> Self {
        self.config.allow_send_big_aecp_payloads = allow;
        self
    }

    pub fn ignore_invalid_non_success_aem_responses(mut self, ignore: bool) -> Self {
        self.config.ignore_invalid_non_success_aem_responses = ignore;
        self
    }

    pub fn feature_redundancy(mut self, enable: bool) -> Self {
        self.config.feature_redundancy = enable;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = Some(timeout);
        self
    }

    pub fn command_attempts(mut self, attempts: u8) -> Self {
        self.config.command_attempts = Some(attempts);
        self
    }

    pub fn acmp_timeout_override(
        mut self,
        message_type: AcmpMessageType,
        timeout: Duration,
    ) -> Self {
        self.config
            .acmp_timeout_overrides
            .insert(message_type, timeout);
        self
    }

    /// Build the configuration
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
