pub mod core;
pub mod mmu;
pub mod window;

pub use self::core::Core;
pub use mmu::Mmu;
pub use window::Window;
