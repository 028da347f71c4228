//! The four résumé tools: cover-letter generator, résumé checker, résumé-JD
//! matcher, and the career-coach chat. Each tool owns one fixed prompt
//! template and one fixed sampling config; the handlers wire UI input to
//! extraction, templating, the chat client, and session state.

pub mod controller;
pub mod handlers;
pub mod prompts;
pub mod template;
