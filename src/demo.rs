//! Built-in sample export for trying the pipeline without a file or API key.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::collections::HashMap;

use crate::types::{RawAuthor, RawContent, RawConversation, RawMessage, RawNode};

/// Demo timestamps count back from 2024-06-01T00:00:00Z.
pub const DEMO_EPOCH: f64 = 1_717_200_000.0;
const DAY: f64 = 86_400.0;

struct DemoTemplate {
    id: &'static str,
    title: &'static str,
    days_ago: f64,
    turns: &'static [(&'static str, &'static str)],
}

const TEMPLATES: &[DemoTemplate] = &[
    DemoTemplate {
        id: "demo-1",
        title: "Learning React Hooks",
        days_ago: 7.0,
        turns: &[
            ("user", "Can you explain React hooks and how they work in a JavaScript project?"),
            ("assistant", "React hooks are JavaScript functions that let you use state and other React features inside function components. The most common hooks are useState for local state and useEffect for side effects."),
            ("user", "Can you show me a JavaScript example of useState?"),
            ("assistant", "Sure! const [count, setCount] = useState(0); creates a state variable called count with an initial value of zero, and setCount updates it."),
        ],
    },
    DemoTemplate {
        id: "demo-2",
        title: "JavaScript Array Methods",
        days_ago: 5.0,
        turns: &[
            ("user", "What are the most useful JavaScript array methods I should know?"),
            ("assistant", "The essential JavaScript array methods are map for transforming arrays, filter for selecting elements, reduce for aggregating values, forEach for iteration, and find for locating a single element."),
            ("user", "Is reduce slower than a plain JavaScript loop?"),
            ("assistant", "For most code the difference is negligible. Modern JavaScript engines optimise reduce well, so prefer whichever version keeps your code readable."),
        ],
    },
    DemoTemplate {
        id: "demo-3",
        title: "Python Data Structures",
        days_ago: 3.0,
        turns: &[
            ("user", "What are the main data structures in Python and when should I use each one?"),
            ("assistant", "Python offers lists for ordered mutable data, tuples for ordered immutable data, dictionaries for key-value data, and sets for unique data. Pick the structure that matches how you access your data."),
        ],
    },
    DemoTemplate {
        id: "demo-4",
        title: "Pandas Data Cleaning",
        days_ago: 2.0,
        turns: &[
            ("user", "How do I clean messy data with pandas in Python?"),
            ("assistant", "Start by loading the data into a DataFrame, then drop duplicate rows, fill or remove missing values, and normalise column types. Python makes each step a single pandas call, so data cleaning stays readable."),
        ],
    },
    DemoTemplate {
        id: "demo-5",
        title: "Sourdough Starter Tips",
        days_ago: 1.0,
        turns: &[
            ("user", "My sourdough starter smells sour and is not rising. What should I do?"),
            ("assistant", "A sourdough starter that smells sharp is usually hungry. Feed it twice a day with equal weights of flour and water, keep it somewhere warm, and it should double within a week. Great bread takes patience!"),
        ],
    },
];

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Five conversations: two about JavaScript, two about Python data work, one
/// about bread.
pub fn demo_export() -> Vec<RawConversation> {
    TEMPLATES
        .iter()
        .map(|template| {
            raw_conversation(
                template.id,
                template.title,
                DEMO_EPOCH - template.days_ago * DAY,
                template.turns,
            )
        })
        .collect()
}

/// A larger export built from the demo templates, reproducible per seed.
pub fn generate_demo_export(count: usize, seed: u64) -> Vec<RawConversation> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..count)
        .map(|i| {
            let template = &TEMPLATES[rng.gen_range(0..TEMPLATES.len())];
            let days_ago = rng.gen_range(0.0..365.0);
            raw_conversation(
                &format!("{}-{}", template.id, i),
                &format!("{} #{}", template.title, i + 1),
                DEMO_EPOCH - days_ago * DAY,
                template.turns,
            )
        })
        .collect()
}

/// Builds the export tree: an empty root, a system prompt, then one node per
/// turn, each the only child of the one before.
fn raw_conversation(
    id: &str,
    title: &str,
    create_time: f64,
    turns: &[(&str, &str)],
) -> RawConversation {
    let mut mapping = HashMap::new();
    let root_id = format!("{}-root", id);

    let all_turns = std::iter::once(("system", SYSTEM_PROMPT)).chain(turns.iter().copied());
    let mut parent = root_id.clone();
    let mut node_ids = vec![root_id.clone()];
    let mut messages = Vec::new();

    for (n, (role, text)) in all_turns.enumerate() {
        let node_id = format!("{}-node-{}", id, n);
        messages.push((
            node_id.clone(),
            parent.clone(),
            RawMessage {
                id: Some(format!("{}-msg-{}", id, n)),
                author: RawAuthor {
                    role: role.to_string(),
                },
                content: Some(RawContent {
                    content_type: Some("text".to_string()),
                    parts: vec![Value::String(text.to_string())],
                }),
                create_time: Some(create_time + n as f64 * 60.0),
            },
        ));
        node_ids.push(node_id.clone());
        parent = node_id;
    }

    mapping.insert(
        root_id.clone(),
        RawNode {
            id: Some(root_id.clone()),
            message: None,
            parent: None,
            children: node_ids.get(1).cloned().into_iter().collect(),
        },
    );

    for (n, (node_id, parent_id, message)) in messages.into_iter().enumerate() {
        let children = node_ids.get(n + 2).cloned().into_iter().collect();
        mapping.insert(
            node_id.clone(),
            RawNode {
                id: Some(node_id),
                message: Some(message),
                parent: Some(parent_id),
                children,
            },
        );
    }

    let last_turn = turns.len() as f64 * 60.0;
    RawConversation {
        id: id.to_string(),
        title: Some(title.to_string()),
        create_time: Some(create_time),
        update_time: Some(create_time + last_turn),
        current_node: node_ids.last().cloned(),
        mapping,
    }
}
