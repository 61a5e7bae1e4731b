pub mod bundle;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod stats;
pub mod validate;

pub mod export {
    include!(concat!(env!("OUT_DIR"), "/exposure_notification.rs"));
}
