//! Fixed catalogue of AMT commands and power-state lookup tables.
//!
//! Each logical command maps to one or two literal WS-Man request bodies
//! embedded at compile time. Nothing here is generated dynamically beyond
//! the single enumeration-context substitution performed by the engine.

use crate::error::AmtError;

/// Logical AMT command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    Info,
    Up,
    Down,
    Reset,
    Reboot,
    Shutdown,
    BootcfgPxe,
    BootcfgHdd,
    PingEnable,
    PingDisable,
    WebEnable,
    WebDisable,
    SolEnable,
    SolDisable,
}

/// One or two request payloads for a logical command
pub struct CommandDefinition {
    pub two_step: bool,
    pub step_one: &'static str,
    /// Empty for single-step commands. For `Info` it carries a single
    /// `{enum_context}` substitution slot.
    pub step_two: &'static str,
}

impl CommandCode {
    /// Resolve the request payload(s) for this command
    pub fn definition(self) -> &'static CommandDefinition {
        use CommandCode::*;
        match self {
            Info => &CommandDefinition {
                two_step: true,
                step_one: include_str!("payloads/wsman_info.xml"),
                step_two: include_str!("payloads/wsman_info_step2.xml"),
            },
            BootcfgPxe => &CommandDefinition {
                two_step: true,
                step_one: include_str!("payloads/wsman_pxeboot.xml"),
                step_two: include_str!("payloads/wsman_bootconfig.xml"),
            },
            BootcfgHdd => &CommandDefinition {
                two_step: true,
                step_one: include_str!("payloads/wsman_hddboot.xml"),
                step_two: include_str!("payloads/wsman_bootconfig.xml"),
            },
            Up => &CommandDefinition {
                two_step: false,
                step_one: include_str!("payloads/wsman_up.xml"),
                step_two: "",
            },
            Down => &CommandDefinition {
                two_step: false,
                step_one: include_str!("payloads/wsman_down.xml"),
                step_two: "",
            },
            Reset => &CommandDefinition {
                two_step: false,
                step_one: include_str!("payloads/wsman_reset.xml"),
                step_two: "",
            },
            Reboot => &CommandDefinition {
                two_step: false,
                step_one: include_str!("payloads/wsman_reset_graceful.xml"),
                step_two: "",
            },
            Shutdown => &CommandDefinition {
                two_step: false,
                step_one: include_str!("payloads/wsman_shutdown_graceful.xml"),
                step_two: "",
            },
            PingEnable => &CommandDefinition {
                two_step: false,
                step_one: include_str!("payloads/wsman_ping_enable.xml"),
                step_two: "",
            },
            PingDisable => &CommandDefinition {
                two_step: false,
                step_one: include_str!("payloads/wsman_ping_disable.xml"),
                step_two: "",
            },
            WebEnable => &CommandDefinition {
                two_step: false,
                step_one: include_str!("payloads/wsman_webui_enable.xml"),
                step_two: "",
            },
            WebDisable => &CommandDefinition {
                two_step: false,
                step_one: include_str!("payloads/wsman_webui_disable.xml"),
                step_two: "",
            },
            SolEnable => &CommandDefinition {
                two_step: false,
                step_one: include_str!("payloads/wsman_solredir_enable.xml"),
                step_two: "",
            },
            SolDisable => &CommandDefinition {
                two_step: false,
                step_one: include_str!("payloads/wsman_solredir_disable.xml"),
                step_two: "",
            },
        }
    }

    /// Parse the single-letter code stored with scheduled jobs
    pub fn from_short_code(code: &str) -> Result<Self, AmtError> {
        use CommandCode::*;
        match code {
            "X" => Ok(BootcfgPxe),
            "H" => Ok(BootcfgHdd),
            "U" => Ok(Up),
            "D" => Ok(Down),
            "R" => Ok(Reset),
            "B" => Ok(Reboot),
            "S" => Ok(Shutdown),
            other => Err(AmtError::UnknownCommand(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        use CommandCode::*;
        match self {
            Info => "INFO",
            Up => "UP",
            Down => "DOWN",
            Reset => "RESET",
            Reboot => "REBOOT",
            Shutdown => "SHUTDOWN",
            BootcfgPxe => "BOOTCFGPXE",
            BootcfgHdd => "BOOTCFGHDD",
            PingEnable => "PINGENABLE",
            PingDisable => "PINGDISABLE",
            WebEnable => "WEBENABLE",
            WebDisable => "WEBDISABLE",
            SolEnable => "SOLENABLE",
            SolDisable => "SOLDISABLE",
        }
    }
}

/// CIM power state reported by AMT as "on"
pub const POWER_STATE_ON: i32 = 2;

/// AMT code reported when the exchange failed at the transport level
pub const STATE_TRANSPORT_ERROR: i32 = 16;

/// Sentinel: `<PowerState>` tag present but not numeric
pub const STATE_PARSE_FAILURE: i32 = -1;

/// Sentinel: `<PowerState>` tag absent from the response
pub const STATE_TAG_MISSING: i32 = -2;

/// Map a CIM power state (0-18) to the legacy amtc/EOI code space.
///
/// Rarely seen states collapse to the generic legacy code 9; the parse
/// sentinels -1/-2 pass through untouched so they stay distinguishable
/// from the transport-error code 16.
pub fn legacy_power_state(cim_state: i32) -> i32 {
    match cim_state {
        STATE_PARSE_FAILURE | STATE_TAG_MISSING => cim_state,
        0 => 16, // unknown -> error
        2 => 0,  // on
        3 => 3,  // sleep-light
        4 => 4,  // sleep-deep
        8 => 5,  // off-soft
        _ => 9,  // everything else is "unimplemented" for legacy consumers
    }
}

/// Human text for legacy power-state codes
pub fn legacy_power_state_text(legacy: i32) -> &'static str {
    match legacy {
        0 => "On",
        3 => "Sleep",
        4 => "Hibernate",
        5 => "Soft-Off",
        16 => "Error",
        _ => "unimplemented",
    }
}

/// Human text for HTTP status codes AMT firmware is known to return
pub fn http_status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "BadRequest",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "NotFound",
        408 => "Timeout",
        500 => "InternalError",
        _ => "HTTP",
    }
}

/// Well-known names for probed ports (0 = none open)
pub fn port_name(port: u16) -> &'static str {
    match port {
        0 => "none",
        22 => "SSH",
        3389 => "RDP",
        _ => "open",
    }
}
