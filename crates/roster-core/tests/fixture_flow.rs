//! End-to-end runs of the service against the demo fixture world.

use std::{collections::HashSet, sync::Arc};

use roster_core::{
    aggregate::EngineConfig,
    auth::VerifyOutcome,
    domain::{ConversationKind, ParseMethod, Provenance},
    errors::{AuthError, Error, PermissionError},
    export::ExportFormat,
    service::RosterService,
    streaming::{ProgressFrame, SourceKind},
};
use roster_fixture::{FixturePlatform, DEMO_WORLD};

const ANN: &str = "+1 (555) 000-1";
const TEAM: i64 = -1001;
const ANNOUNCEMENTS: i64 = -1002;

fn service() -> RosterService {
    let platform = FixturePlatform::from_json(DEMO_WORLD).unwrap();
    RosterService::with_engine(
        Arc::new(platform),
        EngineConfig {
            participants_page_size: 3,
            messages_page_size: 3,
            members_progress_every: 2,
            messages_progress_every: 3,
        },
        8,
    )
}

async fn signed_in() -> RosterService {
    let svc = service();
    svc.request_code(ANN).await.unwrap();
    assert_eq!(
        svc.verify_code(ANN, "12345").await.unwrap(),
        VerifyOutcome::Authenticated
    );
    svc
}

fn ids(users: &[roster_core::domain::UserRecord]) -> Vec<i64> {
    users.iter().map(|u| u.id.0).collect()
}

#[tokio::test]
async fn second_factor_account_flow() {
    let svc = service();
    let phone = "+15550002";
    svc.request_code(phone).await.unwrap();

    let err = svc.verify_code(phone, "12345").await.unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::InvalidCode)));

    assert_eq!(
        svc.verify_code(phone, "22222").await.unwrap(),
        VerifyOutcome::NeedTwoFactor
    );
    let err = svc.list_conversations(phone).await.unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::NotAuthenticated)));

    svc.verify_two_factor(phone, "hunter2").await.unwrap();
    assert!(!svc.list_conversations(phone).await.unwrap().is_empty());
}

#[tokio::test]
async fn conversations_are_classified() {
    let svc = signed_in().await;
    let chats = svc.list_conversations(ANN).await.unwrap();
    let kinds: Vec<(i64, ConversationKind, bool)> =
        chats.iter().map(|c| (c.id.0, c.kind, c.is_group)).collect();
    assert_eq!(
        kinds,
        vec![
            (TEAM, ConversationKind::Supergroup, true),
            (ANNOUNCEMENTS, ConversationKind::Channel, true),
            (77, ConversationKind::Group, true),
            (3, ConversationKind::Personal, false),
            (99, ConversationKind::Unknown, false),
        ]
    );
    assert_eq!(chats[3].name, "Cid");
}

#[tokio::test]
async fn sources_merge_into_their_union() {
    let svc = signed_in().await;

    let members = svc.parse(ANN, TEAM, ParseMethod::Members).await.unwrap();
    assert_eq!(ids(&members.users), vec![1, 2]);
    assert_eq!(members.counters.members_seen, 4);

    let messages = svc.parse(ANN, TEAM, ParseMethod::Messages).await.unwrap();
    assert_eq!(ids(&messages.users), vec![2, 7, 3, 1]);
    assert_eq!(messages.counters.messages_processed, 8);
    assert_eq!(messages.users[1].display_name, "No name");

    let both = svc.parse(ANN, TEAM, ParseMethod::Both).await.unwrap();
    assert_eq!(ids(&both.users), vec![1, 2, 7, 3]);
    let provenance: Vec<Provenance> = both.users.iter().map(|u| u.provenance).collect();
    assert_eq!(
        provenance,
        vec![
            Provenance::Both,
            Provenance::Both,
            Provenance::Messages,
            Provenance::Messages
        ]
    );
    assert_eq!(both.users[0].handle.as_deref(), Some("ann"));
    assert_eq!(both.users[0].phone.as_deref(), Some("+15551110001"));

    let union: HashSet<i64> = ids(&members.users)
        .into_iter()
        .chain(ids(&messages.users))
        .collect();
    let merged: HashSet<i64> = ids(&both.users).into_iter().collect();
    assert_eq!(merged, union);
    assert_eq!(merged.len(), both.total());
}

#[tokio::test]
async fn streamed_run_reports_ordered_monotonic_progress() {
    let svc = signed_in().await;
    let frames = svc
        .parse_stream(ANN, TEAM, ParseMethod::Both)
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(frames.first(), Some(&ProgressFrame::ParsingMembers));
    let members_done = frames
        .iter()
        .position(|f| matches!(f, ProgressFrame::MembersDone { .. }))
        .unwrap();
    let parsing_messages = frames
        .iter()
        .position(|f| *f == ProgressFrame::ParsingMessages)
        .unwrap();
    assert!(members_done < parsing_messages);

    let mut last = (0, 0);
    for f in &frames {
        if let ProgressFrame::Progress {
            kind: SourceKind::Messages,
            processed: Some(p),
            found: Some(n),
            ..
        } = f
        {
            assert!(*p >= last.0 && *n >= last.1);
            last = (*p, *n);
        }
    }
    assert_eq!(last, (6, 4));

    match frames.last() {
        Some(ProgressFrame::Complete { users, total, .. }) => {
            assert_eq!(*total, users.len());
            assert_eq!(*total, 4);
        }
        other => panic!("expected complete, got {other:?}"),
    }
}

#[tokio::test]
async fn admin_only_channel_degrades_under_both() {
    let svc = signed_in().await;

    let err = svc
        .parse(ANN, ANNOUNCEMENTS, ParseMethod::Members)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Permission(PermissionError::AdminRequired)
    ));

    let both = svc
        .parse(ANN, ANNOUNCEMENTS, ParseMethod::Both)
        .await
        .unwrap();
    assert_eq!(ids(&both.users), vec![4]);
    assert!(both.counters.members_error.is_some());
}

#[tokio::test]
async fn exports_follow_last_result() {
    let svc = signed_in().await;
    svc.parse(ANN, 77, ParseMethod::Both).await.unwrap();

    let csv = svc.export(ANN, ExportFormat::Tabular).await.unwrap();
    assert_eq!(csv.filename, "users_77.csv");
    assert_eq!(
        String::from_utf8(csv.body).unwrap(),
        "id,first_name,last_name,username,phone,source\n\
         1,Ann,Lee,ann,+15551110001,both\n\
         4,Dee,Park,,+15551110004,both\n"
    );

    let txt = svc.export(ANN, ExportFormat::Text).await.unwrap();
    assert_eq!(
        String::from_utf8(txt.body).unwrap(),
        "Ann Lee | @ann | ID: 1 | Tel: +15551110001\n\
         Dee Park | ID: 4 | Tel: +15551110004\n"
    );

    svc.logout(ANN).await.unwrap();
    assert!(svc.export(ANN, ExportFormat::Structured).await.is_err());
}
