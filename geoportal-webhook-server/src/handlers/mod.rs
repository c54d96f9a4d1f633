pub mod info;
pub mod portal;
pub mod receiver;
