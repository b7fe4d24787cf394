// Module audio - engine clock, automatable signals and offline rendering

pub mod automation;
pub mod offline;
pub mod signal;
pub mod timing;
