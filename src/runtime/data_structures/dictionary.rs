use std::{collections::HashMap, rc::Rc};

use crate::{
    lang::parsing::Body,
    runtime::error::{self, ErrorKind, ScriptError},
};

/// The dictionary of user defined words known to the evaluator.  Each entry maps a word name onto
/// the parsed body that runs when the word is invoked.
///
/// Names are unique; defining a name twice is an error.  Within a session the dictionary only ever
/// grows, and a definition is inserted only once its body has been completely parsed, so partial
/// definitions are never visible.
///
/// Bodies are shared through `Rc` so that invoking a word does not clone its expressions.
#[derive(Clone, Default)]
pub struct Dictionary {
    words: HashMap<String, Rc<Body>>,
}

impl Dictionary {
    /// Create a new empty dictionary.
    pub fn new() -> Dictionary {
        Dictionary {
            words: HashMap::new(),
        }
    }

    /// Insert a new word and its body into the dictionary.  Fails if the name is already taken.
    pub fn define(&mut self, name: String, body: Body) -> error::Result<()> {
        if self.words.contains_key(&name) {
            return Err(ScriptError::new(ErrorKind::Redefinition(name), None));
        }

        let _ = self.words.insert(name, Rc::new(body));
        Ok(())
    }

    /// Look up a word's body by name.
    pub fn get(&self, name: &str) -> Option<Rc<Body>> {
        self.words.get(name).cloned()
    }

    /// Check if a word is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.words.contains_key(name)
    }

    /// How many words have been defined?
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Is the dictionary empty?
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
