pub use quiver_array::*;
#[cfg(feature = "files")]
pub use quiver_file as file;
pub use {quiver_buffer as buffer, quiver_error as error, quiver_ipc as ipc};
