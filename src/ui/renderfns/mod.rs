pub mod header;
pub mod utils;

pub use header::draw_header;
pub use utils::{format_count, format_money, format_percent, notice_color, truncate};
