pub mod anthropic;

/// A remote (or scripted) text translator. Calls are blocking and made one at a time.
pub trait Translator {
    fn name(&self) -> &str;

    /// Translates `text` into `target_lang`. Placeholder tokens in `text` must come back
    /// unchanged.
    fn translate(&mut self, text: &str, target_lang: &str) -> anyhow::Result<String>;
}

impl<T: Translator + ?Sized> Translator for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn translate(&mut self, text: &str, target_lang: &str) -> anyhow::Result<String> {
        (**self).translate(text, target_lang)
    }
}
