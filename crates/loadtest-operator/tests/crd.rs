//! Checks on the CRD manifest printed by `loadtest-operator --crd`

use kube::CustomResourceExt;
use loadtest_common::crd::LoadTest;

fn crd_yaml() -> serde_yaml::Value {
    let yaml = serde_yaml::to_string(&LoadTest::crd()).unwrap();
    serde_yaml::from_str(&yaml).unwrap()
}

#[test]
fn crd_is_namespaced_v1alpha1() {
    let crd = crd_yaml();
    assert_eq!(crd["spec"]["group"], "loadtest.artillery.io");
    assert_eq!(crd["spec"]["scope"], "Namespaced");
    assert_eq!(crd["spec"]["names"]["plural"], "loadtests");
    assert_eq!(crd["spec"]["names"]["shortNames"][0], "lt");
    assert_eq!(crd["spec"]["versions"][0]["name"], "v1alpha1");
}

#[test]
fn crd_has_status_subresource() {
    let crd = crd_yaml();
    let version = &crd["spec"]["versions"][0];
    assert!(version["subresources"]["status"].is_mapping());
}

#[test]
fn crd_schema_exposes_spec_fields() {
    let crd = crd_yaml();
    let spec = &crd["spec"]["versions"][0]["schema"]["openAPIV3Schema"]["properties"]["spec"]
        ["properties"];
    for field in [
        "count",
        "image",
        "args",
        "resources",
        "secretEnvSource",
        "secretMount",
        "usersFile",
    ] {
        assert!(spec[field].is_mapping(), "missing spec field {field}");
    }
    assert_eq!(spec["count"]["minimum"].as_f64(), Some(0.0));
}

#[test]
fn crd_printer_columns() {
    let crd = crd_yaml();
    let columns: Vec<_> = crd["spec"]["versions"][0]["additionalPrinterColumns"]
        .as_sequence()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(columns, ["Workers", "Phase", "Active", "Age"]);
}
