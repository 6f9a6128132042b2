/*!
   Utility functions that are used by the framework.
*/

pub mod assert;
pub mod clock;
pub mod completion;
pub mod fan_out;
pub mod json;
pub mod mutex;
pub mod random;
pub mod retry;
pub mod suspend;
pub mod waiter;
