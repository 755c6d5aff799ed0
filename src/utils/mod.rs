pub mod date_utils;
pub mod decimal_fmt;
pub mod decimal_utils;
