//! MSR (Model-Specific Register) read primitive
//!
//! Reads go through the Linux `msr` driver at `/dev/cpu/<cpu>/msr`, where the
//! file offset selects the register address. Caching of open handles lives in
//! wattflow-agent.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, MsrError>;

/// Errors that can occur while reading an MSR
#[derive(Debug, thiserror::Error)]
pub enum MsrError {
    #[error("Failed to open MSR device for CPU {cpu}: {source}")]
    Open { cpu: u32, source: std::io::Error },

    #[error("Failed to seek to MSR 0x{msr:X} on CPU {cpu}: {source}")]
    Seek {
        cpu: u32,
        msr: u64,
        source: std::io::Error,
    },

    #[error("Failed to read MSR 0x{msr:X} on CPU {cpu}: {source}")]
    Read {
        cpu: u32,
        msr: u64,
        source: std::io::Error,
    },
}

impl MsrError {
    pub fn cpu(&self) -> u32 {
        match self {
            MsrError::Open { cpu, .. } | MsrError::Seek { cpu, .. } | MsrError::Read { cpu, .. } => {
                *cpu
            }
        }
    }

    /// True when the device exists but the caller lacks CAP_SYS_RAWIO
    pub fn is_permission_denied(&self) -> bool {
        let source = match self {
            MsrError::Open { source, .. }
            | MsrError::Seek { source, .. }
            | MsrError::Read { source, .. } => source,
        };
        source.kind() == std::io::ErrorKind::PermissionDenied
    }
}

/// Path of the MSR device node for a CPU
pub fn device_path(cpu: u32) -> PathBuf {
    PathBuf::from(format!("/dev/cpu/{cpu}/msr"))
}

/// An open, read-only MSR device for one CPU
#[derive(Debug)]
pub struct MsrFile {
    file: File,
    cpu: u32,
}

impl MsrFile {
    /// Open `/dev/cpu/<cpu>/msr` (requires root or CAP_SYS_RAWIO)
    pub fn open(cpu: u32) -> Result<Self> {
        let file = File::open(device_path(cpu)).map_err(|source| MsrError::Open { cpu, source })?;
        Ok(Self { file, cpu })
    }

    pub fn cpu(&self) -> u32 {
        self.cpu
    }

    /// Read the 64-bit value of the register at `msr`
    pub fn read(&mut self, msr: u64) -> Result<u64> {
        let cpu = self.cpu;

        self.file
            .seek(SeekFrom::Start(msr))
            .map_err(|source| MsrError::Seek { cpu, msr, source })?;

        let mut buffer = [0u8; 8];
        self.file
            .read_exact(&mut buffer)
            .map_err(|source| MsrError::Read { cpu, msr, source })?;

        Ok(u64::from_le_bytes(buffer))
    }
}

/// One-shot read: open the device, read one register, close it
///
/// # Example
///
/// ```ignore
/// use wattflow_raw::{read_msr, rapl};
///
/// let units = read_msr(0, rapl::msr::MSR_RAPL_POWER_UNIT)?;
/// ```
pub fn read_msr(cpu: u32, msr: u64) -> Result<u64> {
    MsrFile::open(cpu)?.read(msr)
}
