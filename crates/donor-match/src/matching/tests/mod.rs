mod allocation;
mod batch;
mod common;
