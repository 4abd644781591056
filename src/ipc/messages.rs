//! The IPC message type registry.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Discriminant carried as the first field of every [`super::frame::Frame`].
///
/// Kept flat here rather than split across Ipc/Mgr/Snmp namespaces since this
/// crate has one message registry, not three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum MessageType {
    RegisterStrand = 1,
    StrandRegistered = 2,
    FindStrand = 3,
    StrandReady = 4,
    SharedListenRequest = 5,
    SharedListenResponse = 6,
    IpcIoNotification = 7,
    CollapsedForwardingNotification = 8,
    CacheMgrRequest = 9,
    CacheMgrResponse = 10,
    SnmpRequest = 11,
    SnmpResponse = 12,
}
