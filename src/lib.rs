#![doc = include_str!("../README.md")]

pub mod config;
pub mod locator;
pub mod toolkit;

pub mod grant;
pub mod runner;
