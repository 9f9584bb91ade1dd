pub mod autopost;
pub mod corpus;
pub mod engine;
pub mod filter;
pub mod generator;
pub mod harvest;
pub mod markov;
pub mod model;
pub mod scheduler;
pub mod tokenizer;
