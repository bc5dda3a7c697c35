//! Shared test harness modules for the cosm CLI.

use super::*;

mod helpers;
