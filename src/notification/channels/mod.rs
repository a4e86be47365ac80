//! 具体渠道实现

pub mod console;
pub mod desktop;
pub mod email;
pub mod local_file;

pub use console::ConsoleChannel;
pub use desktop::{DesktopBackend, DesktopChannel};
pub use email::{CurlSmtpTransport, EmailChannel, MailTransport};
pub use local_file::LocalFileChannel;
