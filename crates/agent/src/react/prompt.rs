//! System prompt for the reason-act loop.

use agentry_core::tool::Toolbox;
use std::fmt::Write;

/// Renders the system prompt from the available tools.
pub type PromptRenderer = std::sync::Arc<dyn Fn(&Toolbox) -> String + Send + Sync>;

/// Describes the entry grammar and lists the tools, sorted by name.
pub fn default_system_prompt(toolbox: &Toolbox) -> String {
    let mut prompt = String::from(
        "You answer questions by reasoning step by step and using tools.\n\
         \n\
         Write your reply as a sequence of entries. Every entry starts on a new \
         line with its tag followed by a colon and a space:\n\
         \n\
         Question: the question you are answering, or a sub-question\n\
         Assumption: something you take to be true without checking\n\
         Thought: your reasoning about what to do next\n\
         Answer: an intermediate answer\n\
         Action: the name of a tool, followed on the next lines by its input\n\
         Final Answer: the answer to the original question\n\
         \n\
         Rules:\n\
         - An Action must be the last entry of your reply. Stop writing after it.\n\
         - Never write Observation entries. The result of an Action is sent back \
         to you as \"Observation: <result>\".\n\
         - When you know the answer, reply with a Final Answer entry.\n\
         \n\
         Available tools:\n",
    );

    if toolbox.is_empty() {
        prompt.push_str("\n(none)\n");
    }
    for tool in toolbox.tools() {
        let _ = write!(
            prompt,
            "\n{}: {}\nInput: {}\n",
            tool.name(),
            tool.description(),
            tool.input()
        );
    }

    prompt
}
