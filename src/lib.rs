pub mod bus;
pub mod consts;
pub mod cpu;
pub mod region;
pub mod shared_memory;
pub mod video;
pub mod vireo;

use crate::vireo::Vireo;

/// Serializes the machine state into `data`.
///
/// # Errors
///
/// Returns an error if `data` is too small for the state.
pub fn serialize(machine: &Vireo, data: &mut [u8]) -> Result<(), &'static str> {
    match postcard::to_slice(&machine, data) {
        Err(_) => Err("Serialization error."),
        Ok(_) => Ok(()),
    }
}

/// Restores a machine from a previously serialized state.
///
/// # Errors
///
/// Returns an error if the data does not describe a machine state.
pub fn deserialize(data: &[u8]) -> Result<Vireo, &'static str> {
    match postcard::from_bytes::<Vireo>(data) {
        Err(_) => Err("Deserialization error"),
        Ok(m) => Ok(m),
    }
}

pub const fn info() -> (&'static str, &'static str) {
    ("Vireo", env!("CARGO_PKG_VERSION"))
}
