#![cfg(test)]

pub mod fakes;
mod router;
