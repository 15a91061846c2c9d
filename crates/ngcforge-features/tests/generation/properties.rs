use ngcforge_core::{MeasurementSystem, SearchPath, ToolTable};
use ngcforge_features::serialization::{from_text, to_text};
use ngcforge_features::{
    to_gcode, Document, FeatureInstance, FeatureTemplate, GenerationOptions, InsertAt, ParamType,
    Parameter, UiState, UndoLog, ValueContext,
};
use proptest::prelude::*;

const MOVE: &str = "[SUBROUTINE]\n\
type = move\n\
name = Move\n\
\n\
[PARAM_X]\n\
type = float\n\
value = 0\n\
\n\
[PARAM_Z]\n\
type = float\n\
value = 0\n\
\n\
[BEFORE]\n\
content =\n\
\to<#ID> if [#param_z LT 0]\n\
\n\
[CALL]\n\
content =\n\
\tG1 X#param_x Z#param_z\n\
\n\
[AFTER]\n\
content =\n\
\to<#ID> endif\n";

fn imperial() -> ValueContext {
    ValueContext::with_units(MeasurementSystem::Imperial)
}

fn thousandths() -> impl Strategy<Value = f64> {
    (-99_999i64..99_999).prop_map(|n| n as f64 / 1000.0)
}

proptest! {
    #[test]
    fn test_program_survives_save_and_load(
        coords in prop::collection::vec((thousandths(), thousandths()), 1..5)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let resolver = SearchPath::new(dir.path()).without_cwd();
        let options = GenerationOptions { values: imperial(), ..GenerationOptions::default() };
        let template = FeatureTemplate::parse("move.cfg", MOVE).unwrap();

        let mut doc = Document::new();
        for (x, z) in &coords {
            let node = doc.add_instance(&template, InsertAt::End, &options.values);
            let feature = doc.feature_mut(node).unwrap();
            feature.set_param_value("param_x", &x.to_string(), &options.values).unwrap();
            feature.set_param_value("param_z", &z.to_string(), &options.values).unwrap();
        }
        let first = to_gcode(&mut doc, &options, &resolver).text;

        let saved = to_text(&doc, &UiState::default()).unwrap();
        let (mut reloaded, _) = from_text(&saved).unwrap();
        let second = to_gcode(&mut reloaded, &options, &resolver).text;
        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_display_string_is_a_fixed_point(v in thousandths(), digits in 0usize..5) {
        let ctx = imperial();
        let tools = ToolTable::new();
        let mut p = Parameter::new("param_depth", ParamType::Float);
        p.digits = Some(digits);
        p.set_value(&v.to_string(), &ctx);
        let shown = p.get_display_string(&ctx, &tools);
        prop_assert!(!p.set_value(&shown, &ctx));
        prop_assert_eq!(p.get_display_string(&ctx, &tools), shown);
    }

    #[test]
    fn test_undo_then_redo_returns_to_latest(count in 1usize..20, steps in 0usize..25) {
        let mut log = UndoLog::new();
        for i in 0..count {
            log.commit(format!("snapshot {}", i));
        }
        let latest = log.current().map(str::to_string);
        let mut undone = 0;
        for _ in 0..steps {
            if log.undo().is_some() {
                undone += 1;
            }
        }
        prop_assert_eq!(undone, steps.min(count - 1));
        for _ in 0..undone {
            prop_assert!(log.redo().is_some());
        }
        prop_assert!(!log.can_redo());
        prop_assert_eq!(log.current().map(str::to_string), latest);
    }

    #[test]
    fn test_token_does_not_match_longer_name(suffix in "[A-Za-z0-9_]{1,6}") {
        let ctx = imperial();
        let mut feature = FeatureInstance::default();
        let mut p = Parameter::new("param_feed", ParamType::Float);
        p.value = "5".to_string();
        feature.params.push(p);

        let longer = format!("#param_feed{}", suffix);
        prop_assert_eq!(feature.replace_params(&longer, &ctx), longer.clone());
        let spaced = format!("F#param_feed {}", suffix);
        prop_assert_eq!(feature.replace_params(&spaced, &ctx), format!("F5.000000 {}", suffix));
    }
}
