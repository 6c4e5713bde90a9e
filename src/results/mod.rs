pub mod comparison;
pub mod matching;
pub mod record;
pub mod storage;
