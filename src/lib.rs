pub mod content;
pub mod db;
pub mod hero;
pub mod resolver;
pub mod settings;
