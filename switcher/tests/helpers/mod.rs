#![allow(dead_code)]

pub mod fakes;
pub mod polling;
