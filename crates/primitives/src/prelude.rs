pub use crate::block::*;
pub use crate::buf::Buf32;
pub use crate::epoch::*;
pub use crate::jobs::*;
pub use crate::proof::*;
pub use crate::state::*;
pub use crate::tx::*;
