pub mod momentum;
pub mod position;
pub mod render_loop;
pub mod tick;

pub use momentum::*;
pub use position::*;
pub use render_loop::*;
pub use tick::*;
