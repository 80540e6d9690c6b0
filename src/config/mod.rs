mod app;
mod settings;
mod subscription;

pub use self::{app::*, settings::*, subscription::*};
