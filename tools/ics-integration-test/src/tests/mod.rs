/*!
   All test cases are placed within this module.

   We expose the modules as public so that cargo doc
   will pick up the definition by default.
*/

pub mod consumer_onboarding;
pub mod downtime;
pub mod upgrade;
pub mod network_override;
