pub mod config;
pub mod connection;
pub mod dataset;
pub mod graph_store;
pub mod llm;
pub mod loader;
pub mod movie;
pub mod qa_chain;
pub mod query_interface;

#[cfg(test)]
mod test_support;


#[cfg(test)]
mod tests;
