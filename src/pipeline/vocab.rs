use crate::config::LanguageSection;
use crate::terminology::TermPair;

/// Product vocabulary kept in English in every target language.
pub const PROTECTED_TERMS: &[&str] = &[
    "AI Chat",
    "AI Character Chat",
    "AI Companions",
    "AI Companion",
    "Companions",
    "Kiss Video Generator",
    "early access",
    "AI girlfriend",
    "AI boyfriend",
    "NSFW",
    "SFW",
    "Premium",
    "Basic",
    "Free",
    "Pro",
    "Plus",
    "Ultimate",
    "Standard",
    "Advanced",
    "Elite",
    "VIP",
    "Gold",
    "Silver",
    "Bronze",
    "Starter",
    "Enterprise",
    "Business",
    "AI",
    "API",
    "GPT",
    "SDK",
    "Beta",
    "Alpha",
    "video generation",
    "voice chat",
    "voice calls",
    "roleplay",
    "character creation",
    "memory",
    "chat history",
];

// Casing of the match drives the casing of the output, so one entry per phrase is enough.
const NL_DICTIONARY: &[(&str, &str)] = &[
    ("per month", "per maand"),
    ("per year", "per jaar"),
    ("per day", "per dag"),
    ("monthly", "maandelijks"),
    ("yearly", "jaarlijks"),
    ("annually", "jaarlijks"),
    ("daily", "dagelijks"),
    ("unlimited", "onbeperkt"),
    ("limited", "beperkt"),
    ("messages", "berichten"),
    ("message", "bericht"),
    ("credits", "credits"),
    ("images", "afbeeldingen"),
    ("videos", "videos"),
    ("features", "functies"),
    ("feature", "functie"),
    ("access to", "toegang tot"),
    ("includes", "inclusief"),
    ("support", "ondersteuning"),
    ("priority support", "prioriteitsondersteuning"),
    ("customer support", "klantenondersteuning"),
    ("No ads", "Geen advertenties"),
    ("Ad-free", "Advertentievrij"),
    ("Cancel anytime", "Elk moment opzegbaar"),
    ("conversations", "gesprekken"),
    ("interactions", "interacties"),
    ("customization", "aanpassing"),
];

const PT_DICTIONARY: &[(&str, &str)] = &[
    ("per month", "por mês"),
    ("per year", "por ano"),
    ("per day", "por dia"),
    ("monthly", "mensal"),
    ("yearly", "anual"),
    ("annually", "anualmente"),
    ("daily", "diário"),
    ("unlimited", "ilimitado"),
    ("limited", "limitado"),
    ("messages", "mensagens"),
    ("message", "mensagem"),
    ("credits", "créditos"),
    ("images", "imagens"),
    ("videos", "vídeos"),
    ("features", "recursos"),
    ("feature", "recurso"),
    ("access to", "acesso a"),
    ("includes", "inclui"),
    ("support", "suporte"),
    ("priority support", "suporte prioritário"),
    ("customer support", "suporte ao cliente"),
    ("No ads", "Sem anúncios"),
    ("Ad-free", "Sem anúncios"),
    ("Cancel anytime", "Cancele a qualquer momento"),
    ("conversations", "conversas"),
    ("interactions", "interações"),
    ("customization", "personalização"),
];

/// Vocabulary shipped with the binary for a target language, if any.
pub fn builtin_language(code: &str) -> Option<LanguageSection> {
    let (name, dictionary) = match code.trim().to_ascii_lowercase().as_str() {
        "nl" => ("Dutch", NL_DICTIONARY),
        "pt" => ("Portuguese", PT_DICTIONARY),
        _ => return None,
    };
    Some(LanguageSection {
        name: Some(name.to_string()),
        protected_terms: PROTECTED_TERMS.iter().map(|t| t.to_string()).collect(),
        dictionary: dictionary
            .iter()
            .map(|(s, t)| TermPair(s.to_string(), t.to_string()))
            .collect(),
    })
}

pub const BUILTIN_LANGUAGES: &[&str] = &["nl", "pt"];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freezer::TermGuard;
    use crate::terminology::{GuardedDictionary, TermDictionary};

    fn guarded(code: &str, text: &str) -> String {
        let lang = builtin_language(code).unwrap();
        let guard = TermGuard::new(&lang.protected_terms).unwrap();
        let dictionary = TermDictionary::new(lang.dictionary).unwrap();
        GuardedDictionary {
            guard: &guard,
            dictionary: &dictionary,
        }
        .translate(text)
    }

    #[test]
    fn dutch_feature_lines() {
        assert_eq!(guarded("nl", "Unlimited messages"), "Onbeperkt berichten");
        assert_eq!(guarded("nl", "Priority support"), "Prioriteitsondersteuning");
        assert_eq!(
            guarded("nl", "Access to Kiss Video Generator"),
            "Toegang tot Kiss Video Generator"
        );
        assert_eq!(
            guarded("nl", "No ads, cancel anytime"),
            "Geen advertenties, elk moment opzegbaar"
        );
    }

    #[test]
    fn hyphenated_phrases_beat_protected_words() {
        assert_eq!(guarded("nl", "Ad-free"), "Advertentievrij");
        assert_eq!(guarded("nl", "Ad-free, Free forever"), "Advertentievrij, Free forever");
        assert_eq!(guarded("pt", "AD-FREE"), "SEM ANÚNCIOS");
    }

    #[test]
    fn portuguese_feature_lines() {
        assert_eq!(guarded("pt", "Unlimited AI Chat"), "Ilimitado AI Chat");
        assert_eq!(guarded("pt", "billed monthly"), "billed mensal");
    }

    #[test]
    fn unknown_language_has_no_builtin() {
        assert!(builtin_language("fr").is_none());
        for code in BUILTIN_LANGUAGES {
            assert!(builtin_language(code).is_some());
        }
    }
}
