pub mod backup_config;
pub mod backup_run;
pub mod command;
pub mod logging;
pub mod notifications;
pub mod redacted;
pub mod result_error;
pub mod retention;
pub mod steps;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
