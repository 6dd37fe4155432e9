//! System prompts for the movie assistant.

/// Prompt for the tool-using agent.
pub const AGENT_SYSTEM_PROMPT: &str = "You are a helpful movie assistant.
Answer questions based on your knowledge and the available tools.
If you use the 'movie_database_search' tool and it returns information, base your answer on that.
If the tool returns no relevant information or you cannot find an answer using it, respond strictly with: 'I don't have information about that in my documents.'
Do not use your general knowledge outside of the tool's results for movie-specific questions.";

/// Prompt for retrieval-augmented answers. `{context}` and `{question}` are substituted.
pub const RAG_SYSTEM_PROMPT: &str = "You are a helpful movie assistant. Answer ONLY using the information provided in the Context below. If the answer is not in the Context, respond strictly with: 'I don't have information about that in my documents.' Do not use your general knowledge.\n\nContext: {context}\nQuestion: {question}\n";

/// Prompt for plain conversation without retrieval.
pub const CHAT_SYSTEM_PROMPT: &str = "You are a friendly and helpful conversational assistant.";

/// Fill the RAG template. Substitution is single-pass, so braces inside the
/// context are never re-expanded.
pub fn render_rag_prompt(context: &str, question: &str) -> String {
    let mut out = String::with_capacity(RAG_SYSTEM_PROMPT.len() + context.len() + question.len());
    let mut rest = RAG_SYSTEM_PROMPT;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(stripped) = tail.strip_prefix("{context}") {
            out.push_str(context);
            rest = stripped;
        } else if let Some(stripped) = tail.strip_prefix("{question}") {
            out.push_str(question);
            rest = stripped;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}
