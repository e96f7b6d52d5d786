//! Rendering: pure string builders for the dashboard and the focused view.

pub mod dashboard;
pub mod focused;
pub mod theme;

pub use dashboard::{CommandRow, DashboardModel, RowState, VisibleSelection, kill_all_label};
pub use theme::Theme;
