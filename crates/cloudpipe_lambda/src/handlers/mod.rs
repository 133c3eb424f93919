pub mod copy;
pub mod split_lines;
