pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{header, info, key, muted, success, summary_row, table_row, warn};
pub use table::{render_header, render_rows};
pub use theme::{theme, Theme};
