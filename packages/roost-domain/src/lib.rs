pub mod criteria;
pub mod distance;
pub mod listing;
pub mod observation;
pub mod policy;
pub mod population;
pub mod score;
pub mod time_serde;
