//! Client for the userspace WireGuard configuration protocol.
//!
//! A [`wg::device::DeviceConfig`] is rendered as a `set=1` request, written to
//! the device's control socket, and the `errno=<N>` reply is mapped to a
//! [`wg::uapi::UapiError`].

pub mod error;
pub mod wg;
