use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use super::args::DEFAULT_INDICATOR;

/// Command keywords understood by the REPL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum Keyword {
    #[strum(to_string = "READ COILS")]
    ReadCoils,
    #[strum(to_string = "WRITE COIL")]
    WriteCoil,
    #[strum(to_string = "WRITE COILS")]
    WriteCoils,
    #[strum(to_string = "READ DISCRETES")]
    ReadDiscretes,
    #[strum(to_string = "READ INPUTREGS")]
    ReadInputRegisters,
    #[strum(to_string = "READ INPUTREGSB")]
    ReadInputRegistersBits,
    #[strum(to_string = "READ INPUTREGSF")]
    ReadInputRegistersFloats,
    #[strum(to_string = "READ HOLDREGS")]
    ReadHoldingRegisters,
    #[strum(to_string = "READ HOLDREGSB")]
    ReadHoldingRegistersBits,
    #[strum(to_string = "READ HOLDREGSF")]
    ReadHoldingRegistersFloats,
    #[strum(to_string = "WRITE HOLDREG")]
    WriteHoldingRegister,
    #[strum(to_string = "WRITE HOLDREGS")]
    WriteHoldingRegisters,
    #[strum(to_string = "CONNECT")]
    Connect,
    #[strum(to_string = "SET SLAVEID")]
    SetSlaveId,
    #[strum(to_string = "SET IPADDRESS")]
    SetIpAddress,
    #[strum(to_string = "SET PORT")]
    SetPort,
    #[strum(to_string = "HELP")]
    Help,
    #[strum(to_string = "EXIT")]
    Exit,
}

/// Which help section a keyword is listed under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpGroup {
    Modbus,
    Client,
    Hidden,
}

impl Keyword {
    /// Argument synopsis shown in the help table
    pub fn synopsis(&self) -> &'static str {
        match self {
            Keyword::ReadCoils
            | Keyword::ReadDiscretes
            | Keyword::ReadInputRegisters
            | Keyword::ReadInputRegistersBits
            | Keyword::ReadInputRegistersFloats
            | Keyword::ReadHoldingRegisters
            | Keyword::ReadHoldingRegistersBits
            | Keyword::ReadHoldingRegistersFloats => "--startAddress  --numberToRead",
            Keyword::WriteCoil | Keyword::WriteHoldingRegister => "--address       --value",
            Keyword::WriteCoils | Keyword::WriteHoldingRegisters => "--startAddress  --values",
            Keyword::Connect => "--ipAddress     --port         --slaveId",
            Keyword::SetSlaveId => "--slaveId",
            Keyword::SetIpAddress => "--ipAddress",
            Keyword::SetPort => "--port",
            Keyword::Help | Keyword::Exit => "",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Keyword::ReadCoils => "Read range of coils.",
            Keyword::WriteCoil => "Write to a single coil. {true/false}",
            Keyword::WriteCoils => "Write to multiple coils. {comma-separated true/false}",
            Keyword::ReadDiscretes => "Read range of discrete inputs.",
            Keyword::ReadInputRegisters => "Read range of input registers.",
            Keyword::ReadInputRegistersBits => "Read range of input registers as bits.",
            Keyword::ReadInputRegistersFloats => {
                "Read range of input registers as 32-bit floats. {numberToRead counts floats}"
            }
            Keyword::ReadHoldingRegisters => "Read range of holding registers.",
            Keyword::ReadHoldingRegistersBits => "Read range of holding registers as bits.",
            Keyword::ReadHoldingRegistersFloats => {
                "Read range of holding registers as 32-bit floats. {numberToRead counts floats}"
            }
            Keyword::WriteHoldingRegister => {
                "Write to a single holding register. {uint16 OR 32-bit float OR 16 bit binary string (LSB->MSB)}"
            }
            Keyword::WriteHoldingRegisters => {
                "Write to multiple holding registers. {comma-separated uint16s OR 32-bit floats OR 16 bit binary strings (LSB->MSB)}"
            }
            Keyword::Connect => "Connect to slave with ip, port and slave id.",
            Keyword::SetSlaveId => "Set target slave ID. {0-255}",
            Keyword::SetIpAddress => "Set target slave IP address. Will force a reconnect.",
            Keyword::SetPort => "Set target slave TCP port. Will force a reconnect.",
            Keyword::Help => "Show this list.",
            Keyword::Exit => "Disconnect and quit.",
        }
    }

    pub fn group(&self) -> HelpGroup {
        match self {
            Keyword::Connect | Keyword::SetSlaveId | Keyword::SetIpAddress | Keyword::SetPort => {
                HelpGroup::Client
            }
            Keyword::Help | Keyword::Exit => HelpGroup::Hidden,
            _ => HelpGroup::Modbus,
        }
    }

    /// One formatted help line
    pub fn help_line(&self) -> String {
        format!(
            "{:<18} {:<42} || {}",
            self.to_string(),
            self.synopsis(),
            self.description()
        )
    }

    pub fn in_group(group: HelpGroup) -> impl Iterator<Item = Keyword> {
        Keyword::iter().filter(move |keyword| keyword.group() == group)
    }
}

/// One operator input line, uppercased, split into keyword and arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Normalized keyword text (everything before the first indicator)
    pub keyword_text: String,
    pub keyword: Option<Keyword>,
    /// The full uppercased line, used for argument lookup
    pub text: String,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let text = line.trim().to_uppercase();
        let head = text.split(DEFAULT_INDICATOR).next().unwrap_or_default();
        let keyword_text = head.split_whitespace().collect::<Vec<_>>().join(" ");
        let keyword = Keyword::from_str(&keyword_text).ok();
        Self {
            keyword_text,
            keyword,
            text,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.is_empty()
    }
}
