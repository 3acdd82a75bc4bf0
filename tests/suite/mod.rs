mod config;
mod openai;
mod pipeline;
