mod report;

pub use report::{render_report, render_server_list};
