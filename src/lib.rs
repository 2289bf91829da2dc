pub mod app_core;
pub mod frame_loop;
pub mod runtime;
pub mod svg_view;

pub use app_core::{PuzzleSession, SessionSnapshot, SessionSubscriber, SessionSubscription};
pub use frame_loop::{FrameLoop, FrameQueue};
pub use runtime::{Clock, ManualClock, PuzzleView, SystemClock};
pub use svg_view::{render_svg, SvgView};
