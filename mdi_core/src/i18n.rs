//! Localized message catalog.
//!
//! Every user-facing sentence the engine can produce is looked up here by
//! key. Warnings, reasons, findings and tiers are structured values that
//! implement [`Localized`]; turning them into text is the job of a
//! [`MessageResolver`], normally a [`MessageCatalog`].
//!
//! Lookup order is: configured language, configured fallback, English,
//! and finally the key itself (logged as missing). Templates use
//! `${name}` placeholders.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

/// Supported catalog languages
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
        }
    }

    fn table(self) -> &'static HashMap<&'static str, &'static str> {
        match self {
            Language::En => &EN,
            Language::Es => &ES,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "es" | "spanish" | "español" => Ok(Language::Es),
            other => Err(Error::Config(format!("Unsupported language: {}", other))),
        }
    }
}

/// Template parameters: placeholder name and its already-formatted value
pub type Params<'a> = [(&'a str, String)];

/// Renders a message key with parameters into text
pub trait MessageResolver {
    fn resolve(&self, key: &str, params: &Params<'_>) -> String;
}

/// A structured value that has a localized rendering
pub trait Localized {
    /// Catalog key for this value
    fn key(&self) -> &'static str;

    /// Placeholder values for the template
    fn params(&self) -> Vec<(&'static str, String)>;

    /// Render through the given resolver
    fn render(&self, resolver: &dyn MessageResolver) -> String {
        resolver.resolve(self.key(), &self.params())
    }
}

/// Explicit resolver instance: a language plus optional fallback
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCatalog {
    pub language: Language,
    #[serde(default)]
    pub fallback: Option<Language>,
}

impl MessageCatalog {
    pub fn new(language: Language, fallback: Option<Language>) -> Self {
        Self { language, fallback }
    }

    /// Look up the raw template for `key` following the fallback chain
    pub fn template(&self, key: &str) -> Option<&'static str> {
        let chain = [Some(self.language), self.fallback, Some(Language::En)];
        chain
            .into_iter()
            .flatten()
            .find_map(|lang| lang.table().get(key).copied())
    }

    /// Translate `key`, interpolating `params`
    pub fn t(&self, key: &str, params: &Params<'_>) -> String {
        match self.template(key) {
            Some(template) => interpolate(template, params),
            None => {
                tracing::warn!(
                    "Missing message key '{}' for language {}",
                    key,
                    self.language
                );
                key.to_string()
            }
        }
    }
}

impl MessageResolver for MessageCatalog {
    fn resolve(&self, key: &str, params: &Params<'_>) -> String {
        self.t(key, params)
    }
}

/// Replace `${name}` placeholders. Unknown placeholders stay verbatim.
pub fn interpolate(template: &str, params: &Params<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match params.iter().find(|(k, _)| *k == name) {
                    Some((_, value)) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

// ============================================================================
// Process-wide default resolver
// ============================================================================

static GLOBAL: Lazy<RwLock<MessageCatalog>> =
    Lazy::new(|| RwLock::new(MessageCatalog::default()));

/// Set the process-wide default language. Call once during start-up.
pub fn configure(language: Language, fallback: Option<Language>) {
    let mut guard = GLOBAL.write().unwrap_or_else(|e| e.into_inner());
    *guard = MessageCatalog::new(language, fallback);
    tracing::debug!("Message catalog configured: {} (fallback {:?})", language, fallback);
}

/// Snapshot of the process-wide resolver
pub fn current() -> MessageCatalog {
    *GLOBAL.read().unwrap_or_else(|e| e.into_inner())
}

/// Translate with the process-wide resolver
pub fn t(key: &str, params: &Params<'_>) -> String {
    current().t(key, params)
}

// ============================================================================
// Formatting helpers shared by Localized impls
// ============================================================================

/// Insulin units with one decimal
pub(crate) fn units(value: f64) -> String {
    format!("{:.1}", value)
}

/// Glucose or percentages as whole numbers
pub(crate) fn whole(value: f64) -> String {
    format!("{:.0}", value)
}

// ============================================================================
// Tables
// ============================================================================

static EN: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        // Dose warnings
        ("warning.hypoglycemia", "Glucose ${glucose} mg/dL is below ${threshold}. Do not inject; take ${carbs} g of fast-acting carbohydrates and recheck in 15 minutes."),
        ("warning.check_ketones", "Glucose ${glucose} mg/dL is above ${threshold}. Check ketones before correcting."),
        ("warning.stacking_risk", "${iob} U of insulin still active with glucose at ${glucose} mg/dL. Risk of insulin stacking."),
        ("warning.iob_covers_carbs", "Active insulin (${iob} U) already covers ${carbs} g of carbohydrates. Watch for a late rise."),
        ("warning.nocturnal_dose", "Dose of ${dose} U exceeds the nighttime limit of ${limit} U. Consider a smaller dose and a 3 AM check."),
        ("warning.high_dose", "Dose of ${dose} U is above ${limit} U. Double-check the inputs before injecting."),
        ("warning.alcohol", "Alcohol raises the risk of delayed hypoglycemia. Eat carbohydrates and check glucose before sleeping."),
        ("warning.split_high_fat", "High-fat meal: inject ${immediate} U now and ${delayed} U in ${hours} hours."),
        // Pre-sleep
        ("presleep.eat_snack", "Projected overnight glucose is ${projected} mg/dL. Eat ${carbs} g of slow carbohydrates before sleeping."),
        ("presleep.small_correction", "Glucose ${glucose} mg/dL is high. Take a conservative ${dose} U correction."),
        ("presleep.small_correction_recheck", "Glucose ${glucose} mg/dL is high. Take a conservative ${dose} U correction and recheck at 3 AM."),
        ("presleep.sleep", "Glucose ${glucose} mg/dL is expected to stay in a safe range overnight."),
        // Between meals
        ("between.must_wait", "Only ${hours} hours since the last injection. Wait at least ${min} hours before correcting."),
        ("between.no_correction_needed", "Active insulin (${iob} U) already covers the correction. No extra dose needed."),
        ("between.below_target", "Glucose ${glucose} mg/dL is at or below target. No correction needed."),
        ("between.correction", "Take ${dose} U and recheck glucose in ${hours} hours."),
        // Patterns
        ("pattern.recurring_hypo", "Low glucose around ${time} on ${days} of ${total} days. Consider reducing the dose acting at this hour."),
        ("pattern.recurring_hyper", "High glucose around ${time} on ${days} of ${total} days. Consider increasing the dose acting at this hour."),
        ("pattern.high_variability", "Glucose variability is high (SD ${sd} mg/dL). Aim for consistent meal timing and carbohydrate counting."),
        ("pattern.none", "No recurring patterns detected."),
        // Tiers
        ("tier.urgent_adjustment", "Hypoglycemia in ${hypo}% of readings. Dosing parameters need urgent adjustment with your doctor."),
        ("tier.caution", "Hypoglycemia in ${hypo}% of readings. Use caution and review doses with your doctor."),
        ("tier.review_poor_control", "Only ${inRange}% of readings in range. Review the insulin profile."),
        ("tier.review_poor_control_hyper", "Only ${inRange}% of readings in range and ${hyper}% above range. Doses may be too low; review the insulin profile."),
        ("tier.optimize", "${inRange}% of readings in range. The parameters can be optimized."),
        ("tier.continue", "${inRange}% of readings in range. Continue with the current parameters."),
        ("tier.continue_monitoring", "${inRange}% of readings in range with ${hypo}% low. Continue and keep monitoring lows."),
        ("tier.model_working_well", "${inRange}% of readings in range with minimal lows. The dosing model is working well."),
        ("tier.excellent", "Excellent control: ${inRange}% of readings in range and no hypoglycemia."),
        // CLI labels
        ("label.dose", "Recommended dose"),
        ("label.iob", "Insulin on board"),
        ("label.breakdown", "Carbs ${carb} U + correction ${correction} U - IOB ${iob} U"),
        ("label.warnings", "Warnings"),
        ("label.patterns", "Patterns"),
        ("label.in_range", "Time in range"),
        ("label.profile_ok", "Profile is valid"),
    ])
});

static ES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("warning.hypoglycemia", "Glucosa ${glucose} mg/dL por debajo de ${threshold}. No se inyecte; tome ${carbs} g de carbohidratos rápidos y vuelva a medir en 15 minutos."),
        ("warning.check_ketones", "Glucosa ${glucose} mg/dL por encima de ${threshold}. Mida cetonas antes de corregir."),
        ("warning.stacking_risk", "Aún hay ${iob} U de insulina activa con glucosa en ${glucose} mg/dL. Riesgo de acumulación de insulina."),
        ("warning.iob_covers_carbs", "La insulina activa (${iob} U) ya cubre ${carbs} g de carbohidratos. Vigile una subida tardía."),
        ("warning.nocturnal_dose", "La dosis de ${dose} U supera el límite nocturno de ${limit} U. Considere una dosis menor y un control a las 3 AM."),
        ("warning.high_dose", "La dosis de ${dose} U supera ${limit} U. Revise los datos antes de inyectarse."),
        ("warning.alcohol", "El alcohol aumenta el riesgo de hipoglucemia tardía. Coma carbohidratos y mida la glucosa antes de dormir."),
        ("warning.split_high_fat", "Comida rica en grasa: inyecte ${immediate} U ahora y ${delayed} U dentro de ${hours} horas."),
        ("presleep.eat_snack", "La glucosa nocturna prevista es ${projected} mg/dL. Coma ${carbs} g de carbohidratos lentos antes de dormir."),
        ("presleep.small_correction", "Glucosa ${glucose} mg/dL alta. Aplique una corrección conservadora de ${dose} U."),
        ("presleep.small_correction_recheck", "Glucosa ${glucose} mg/dL alta. Aplique una corrección conservadora de ${dose} U y mida de nuevo a las 3 AM."),
        ("presleep.sleep", "Se espera que la glucosa ${glucose} mg/dL se mantenga en un rango seguro durante la noche."),
        ("between.must_wait", "Solo han pasado ${hours} horas desde la última inyección. Espere al menos ${min} horas antes de corregir."),
        ("between.no_correction_needed", "La insulina activa (${iob} U) ya cubre la corrección. No se necesita dosis adicional."),
        ("between.below_target", "Glucosa ${glucose} mg/dL en el objetivo o por debajo. No se necesita corrección."),
        ("between.correction", "Aplique ${dose} U y vuelva a medir la glucosa en ${hours} horas."),
        ("pattern.recurring_hypo", "Glucosa baja alrededor de las ${time} en ${days} de ${total} días. Considere reducir la dosis que actúa a esa hora."),
        ("pattern.recurring_hyper", "Glucosa alta alrededor de las ${time} en ${days} de ${total} días. Considere aumentar la dosis que actúa a esa hora."),
        ("pattern.high_variability", "La variabilidad de la glucosa es alta (DE ${sd} mg/dL). Procure horarios de comida y conteo de carbohidratos constantes."),
        ("pattern.none", "No se detectaron patrones recurrentes."),
        ("tier.urgent_adjustment", "Hipoglucemia en el ${hypo}% de las lecturas. Los parámetros requieren un ajuste urgente con su médico."),
        ("tier.caution", "Hipoglucemia en el ${hypo}% de las lecturas. Precaución: revise las dosis con su médico."),
        ("tier.review_poor_control", "Solo el ${inRange}% de las lecturas en rango. Revise el perfil de insulina."),
        ("tier.review_poor_control_hyper", "Solo el ${inRange}% de las lecturas en rango y el ${hyper}% por encima. Las dosis pueden ser bajas; revise el perfil de insulina."),
        ("tier.optimize", "${inRange}% de las lecturas en rango. Los parámetros se pueden optimizar."),
        ("tier.continue", "${inRange}% de las lecturas en rango. Continúe con los parámetros actuales."),
        ("tier.continue_monitoring", "${inRange}% de las lecturas en rango con ${hypo}% bajas. Continúe y vigile las hipoglucemias."),
        ("tier.model_working_well", "${inRange}% de las lecturas en rango con hipoglucemias mínimas. El modelo de dosis funciona bien."),
        ("tier.excellent", "Control excelente: ${inRange}% de las lecturas en rango y sin hipoglucemias."),
        ("label.dose", "Dosis recomendada"),
        ("label.iob", "Insulina activa"),
        ("label.breakdown", "Carbohidratos ${carb} U + corrección ${correction} U - insulina activa ${iob} U"),
        ("label.warnings", "Advertencias"),
        ("label.patterns", "Patrones"),
        ("label.in_range", "Tiempo en rango"),
        ("label.profile_ok", "El perfil es válido"),
    ])
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolates_placeholders() {
        let out = interpolate(
            "Take ${dose} U and recheck in ${hours} hours.",
            &[("dose", "1.5".into()), ("hours", "2".into())],
        );
        assert_eq!(out, "Take 1.5 U and recheck in 2 hours.");
    }

    #[test]
    fn test_unknown_placeholder_left_verbatim() {
        let out = interpolate("a ${missing} b ${x", &[]);
        assert_eq!(out, "a ${missing} b ${x");
    }

    #[test]
    fn test_spanish_lookup() {
        let catalog = MessageCatalog::new(Language::Es, None);
        let text = catalog.t("label.dose", &[]);
        assert_eq!(text, "Dosis recomendada");
    }

    #[test]
    fn test_missing_key_returns_key() {
        crate::logging::init_test();
        let catalog = MessageCatalog::new(Language::Es, Some(Language::En));
        assert_eq!(catalog.t("no.such.key", &[]), "no.such.key");
    }

    #[test]
    fn test_every_english_key_has_spanish() {
        for key in EN.keys() {
            assert!(ES.contains_key(key), "missing es translation for {}", key);
        }
    }

    #[test]
    fn test_language_from_str() {
        assert_eq!("ES".parse::<Language>().unwrap(), Language::Es);
        assert_eq!("en".parse::<Language>().unwrap(), Language::En);
        assert!("fr".parse::<Language>().is_err());
    }

    #[test]
    fn test_global_configure_roundtrip() {
        configure(Language::Es, Some(Language::En));
        assert_eq!(current().language, Language::Es);
        assert_eq!(t("label.iob", &[]), "Insulina activa");
        configure(Language::En, None);
        assert_eq!(t("label.iob", &[]), "Insulin on board");
    }
}
