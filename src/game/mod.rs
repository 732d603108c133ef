pub mod bomb;
pub mod color;
pub mod constants;
pub mod countdown;
pub mod food;
pub mod grid;
pub mod presenter;
pub mod world;
pub mod worm;
