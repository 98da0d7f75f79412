#![cfg_attr(not(test), no_std)]

pub mod alert;
pub mod controller;

#[cfg(feature = "despi-m02")]
pub mod io;
#[cfg(feature = "despi-m02")]
pub mod tasks;
