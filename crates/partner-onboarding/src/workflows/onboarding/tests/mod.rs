mod common;
mod decisions;
