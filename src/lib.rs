#[cfg(not(target_endian = "little"))]
compile_error!("dyndict requires a little-endian platform");

pub mod buffer;
pub mod dict;
pub mod settings;
