pub mod db_utils;
pub mod geo_time;
