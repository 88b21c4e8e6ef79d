// Spatial rendering module
// Directional gain (ILD) and head delay (ITD) models, and the renderer combining them

pub mod head;
pub mod polar;
pub mod renderer;

pub use head::{fold_azimuth, interaural_delay, HeadModel};
pub use polar::{gain, EarSide, PolarResponse};
pub use renderer::{BinauralRenderer, RenderParams, RenderStatus, RenderedChunk, StereoFrame};
