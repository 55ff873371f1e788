pub mod separation;
