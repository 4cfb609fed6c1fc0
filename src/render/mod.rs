pub mod colormap;
pub mod figure;
pub mod plot;

pub use figure::{render_figure, Figure, RenderStyle};
pub use plot::build_plots;
