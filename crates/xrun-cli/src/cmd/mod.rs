pub mod generate;
pub mod run;
