//! Integration tests for hostname handling, complements and the tree.

use k2bypass::complement::{apply_to_groups, apply_to_service};
use k2bypass::hostname::{get_subdomain, is_main_domain, matches_hostname};
use k2bypass::{
    complement, get_etld, get_hostname, Exclusion, ExclusionState, ExclusionsData,
    ExclusionsTree, NodeType, Service, ServiceDto, ServicesCatalog, ROOT_ID,
};

#[test]
fn test_hostname_pipeline() {
    let cases = [
        ("https://www.mail.example.co.uk/inbox?x=1", "mail.example.co.uk", "example.co.uk", "mail"),
        ("example.com", "example.com", "example.com", ""),
        ("*.cdn.example.org", "*.cdn.example.org", "example.org", "*.cdn"),
        ("http://10.1.2.3:8080/", "10.1.2.3", "10.1.2.3", ""),
    ];

    for (input, hostname, etld, subdomain) in cases {
        let host = get_hostname(input).unwrap();
        assert_eq!(host, hostname, "hostname of {}", input);
        let found = get_etld(&host).unwrap();
        assert_eq!(found, etld, "etld of {}", input);
        assert_eq!(get_subdomain(&host, &found), subdomain, "subdomain of {}", input);
    }
}

#[test]
fn test_etld_idempotent() {
    let hosts = [
        "a.b.c.example.com",
        "example.co.uk",
        "*.example.com.au",
        "co.uk",
        "user.github.io",
        "2001:db8::1",
    ];
    for host in hosts {
        let once = get_etld(host).unwrap();
        assert_eq!(get_etld(&once).unwrap(), once, "{}", host);
    }
}

#[test]
fn test_complement_concrete_subdomain() {
    for host in ["mail.example.com", "a.b.example.org", "www2.example.co.uk"] {
        let result = complement(host, true).unwrap();
        let etld = get_etld(host).unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!((result[0].hostname.as_str(), result[0].enabled), (host, true));
        assert_eq!((result[1].hostname.clone(), result[1].enabled), (etld.clone(), false));
        assert_eq!(
            (result[2].hostname.clone(), result[2].enabled),
            (format!("*.{}", etld), false)
        );
    }
}

#[test]
fn test_matching_rules() {
    assert!(matches_hostname("*.example.com", "a.b.example.com"));
    assert!(!matches_hostname("*.example.com", "example.com"));
    assert!(is_main_domain("domain.com"));
    assert!(!is_main_domain("sub.domain.com"));
}

#[test]
fn test_tree_over_mixed_collections() {
    let mut data = ExclusionsData::new();
    apply_to_groups(&mut data.exclusions_groups, "mail.example.com", true).unwrap();
    apply_to_groups(&mut data.exclusions_groups, "docs.example.com", false).unwrap();

    let dto = ServiceDto::new("video", "Video", vec!["a.com".to_string(), "b.com".to_string()]);
    let mut service = Service::new(&dto);
    apply_to_service(&mut service, "sub.a.com", true);
    data.excluded_services.push(service);

    let tree = ExclusionsTree::from_data(&data, &ServicesCatalog::empty());

    // One group for the shared eTLD
    assert_eq!(data.exclusions_groups.len(), 1);
    assert_eq!(data.exclusions_groups[0].len(), 4);

    assert_eq!(tree.get_exclusion_state("video"), Some(ExclusionState::PartlyEnabled));
    assert_eq!(tree.get_path_exclusions("video").unwrap().len(), 5);
    assert_eq!(tree.get_path_exclusions(ROOT_ID).unwrap().len(), data.leaf_count());
    assert_eq!(tree.enabled_hostnames(), vec!["sub.a.com", "mail.example.com"]);

    let serialized = tree.serialize();
    assert_eq!(serialized.node_type, NodeType::Root);
    assert_eq!(serialized.children[0].node_type, NodeType::Service);
    assert_eq!(serialized.children[1].node_type, NodeType::Group);
}

#[test]
fn test_tree_serialization_is_deterministic() {
    let mut data = ExclusionsData::new();
    apply_to_groups(&mut data.exclusions_groups, "mail.example.com", true).unwrap();
    data.excluded_ips.push(Exclusion::new("8.8.8.8", true));

    let catalog = ServicesCatalog::empty();
    let first = ExclusionsTree::from_data(&data, &catalog).serialize();
    let second = ExclusionsTree::from_data(&data, &catalog).serialize();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}
