//! Embedded text with `__NAME__` placeholders filled from a typed var set.

use std::marker::PhantomData;

/// Placeholder bindings of one template.
pub trait TemplateVars {
    /// `(placeholder, replacement)` pairs, placeholders without underscores.
    fn bindings(&self) -> Vec<(&'static str, String)>;
}

#[derive(Debug, Clone, Copy)]
pub struct Template<V> {
    content: &'static str,
    _vars: PhantomData<V>,
}

impl<V> Template<V> {
    pub const fn new(content: &'static str) -> Self {
        Self {
            content,
            _vars: PhantomData,
        }
    }
}

impl<V: TemplateVars> Template<V> {
    pub fn render(&self, vars: &V) -> String {
        vars.bindings()
            .into_iter()
            .fold(self.content.to_owned(), |text, (name, value)| {
                text.replace(&format!("__{name}__"), &value)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Port(u16);

    impl TemplateVars for Port {
        fn bindings(&self) -> Vec<(&'static str, String)> {
            vec![("PORT", self.0.to_string())]
        }
    }

    #[test]
    fn test_every_occurrence_replaced() {
        let template: Template<Port> = Template::new("a=__PORT__; b=__PORT__; c=__OTHER__");
        assert_eq!(template.render(&Port(80)), "a=80; b=80; c=__OTHER__");
    }
}
