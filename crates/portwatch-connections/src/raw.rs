//! Minimal socket record shared between enumeration strategies, before
//! process/signing/DNS enrichment is applied.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSocket {
    pub pid: u32,
    pub laddr: String,
    pub lport: u16,
    pub raddr: String,
    pub rport: u16,
    pub protocol: String,
    pub status: String,
}
