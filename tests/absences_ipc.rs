mod test_support;

use serde_json::json;
use test_support::{error_code, request_err, request_ok, seeded_workspace, spawn_sidecar};

fn field(error: &serde_json::Value) -> &str {
    error
        .get("details")
        .and_then(|d| d.get("field"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn absences_save_normalizes_each_date_group_once() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = seeded_workspace(&mut stdin, &mut reader, "coverd-absences-save");

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "absences.save",
        json!({
            "absences": [{
                "id": "abs-ada",
                "staffId": "s1",
                "absenceTypeId": "sick",
                "reasonText": "  flu ",
                "dateGroups": [
                    { "dates": ["2024-01-17", "2024-01-15", "2024-01-16", "2024-01-19"], "isFullDay": true },
                    { "dates": ["2024-01-22"], "isFullDay": false, "startTime": "13:00", "endTime": "15:00" }
                ]
            }]
        }),
    );
    assert_eq!(saved["absenceIds"], json!(["abs-ada"]));

    let listed = request_ok(&mut stdin, &mut reader, "2", "absences.list", json!({ "staffId": "s1" }));
    let absences = listed["absences"].as_array().expect("absences");
    assert_eq!(absences.len(), 1);
    let a = &absences[0];
    assert_eq!(a["reasonText"], "flu");
    assert_eq!(a["isLongTermLeave"], false);
    assert!(a.get("createdAt").is_some());

    let intervals = a["intervals"].as_array().expect("intervals");
    assert_eq!(intervals.len(), 3);
    assert_eq!(intervals[0]["continuousStart"], "2024-01-15");
    assert_eq!(intervals[0]["continuousEnd"], "2024-01-17");
    assert_eq!(intervals[0]["isPartialDay"], false);
    assert!(intervals[0].get("individualDates").is_none());
    assert_eq!(intervals[1]["individualDates"], json!(["2024-01-19"]));
    assert_eq!(intervals[2]["individualDates"], json!(["2024-01-22"]));
    assert_eq!(intervals[2]["isPartialDay"], true);
    assert_eq!(intervals[2]["leavesAt"], "13:00");
    assert_eq!(intervals[2]["returnsAt"], "15:00");

    // Saving under the same id replaces the record.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "absences.save",
        json!({
            "absences": [{
                "id": "abs-ada",
                "staffId": "s1",
                "absenceTypeId": "sick",
                "dateGroups": [{ "dates": ["2024-02-05"] }]
            }]
        }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "4", "absences.list", json!({}));
    let absences = listed["absences"].as_array().expect("absences");
    assert_eq!(absences.len(), 1);
    assert_eq!(absences[0]["intervals"], json!([{ "individualDates": ["2024-02-05"], "isPartialDay": false }]));

    let outside = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "absences.list",
        json!({ "from": "2024-03-01", "to": "2024-03-31" }),
    );
    assert_eq!(outside["absences"], json!([]));

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "absences.delete",
        json!({ "absenceIds": ["abs-ada", "missing"] }),
    );
    assert_eq!(deleted["deleted"], 1);
}

#[test]
fn absences_save_reports_field_errors_and_writes_nothing() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = seeded_workspace(&mut stdin, &mut reader, "coverd-absences-errors");

    let e = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "absences.save",
        json!({ "absences": [{ "staffId": "", "absenceTypeId": "sick", "dateGroups": [{ "dates": ["2024-01-15"] }] }] }),
    );
    assert_eq!(error_code(&e), "bad_params");
    assert_eq!(field(&e), "absences[0].staffId");

    let e = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "absences.save",
        json!({ "absences": [{
            "staffId": "s1",
            "absenceTypeId": "sick",
            "dateGroups": [{ "dates": ["2024-01-15"], "isFullDay": false, "startTime": "10:00", "endTime": "09:00" }]
        }] }),
    );
    assert_eq!(field(&e), "absences[0].dateGroups[0].endTime");

    let e = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "absences.save",
        json!({ "absences": [{
            "staffId": "s1",
            "absenceTypeId": "sick",
            "isLongTermLeave": true,
            "dateGroups": [{ "dates": ["2024-01-15"] }]
        }] }),
    );
    assert_eq!(field(&e), "absences[0].dateGroups");

    // Second record is bad: the first must not be stored either.
    let e = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "absences.save",
        json!({ "absences": [
            { "staffId": "s1", "absenceTypeId": "sick", "dateGroups": [{ "dates": ["2024-01-15"] }] },
            { "staffId": "nobody", "absenceTypeId": "sick", "dateGroups": [{ "dates": ["2024-01-15"] }] }
        ] }),
    );
    assert_eq!(field(&e), "absences[1].staffId");
    let listed = request_ok(&mut stdin, &mut reader, "5", "absences.list", json!({}));
    assert_eq!(listed["absences"], json!([]));
}

#[test]
fn long_term_leave_collapses_to_one_range() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = seeded_workspace(&mut stdin, &mut reader, "coverd-absences-long-term");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "absences.save",
        json!({ "absences": [{
            "id": "ltl",
            "staffId": "s1",
            "absenceTypeId": "sick",
            "isLongTermLeave": true,
            "dateGroups": [{ "dates": ["2024-01-08", "2024-01-10", "2024-03-01"] }],
            "longTermLeaveGroups": [{ "groupId": "10A", "coveringStaffId": "s3" }]
        }] }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "2", "absences.list", json!({}));
    let a = &listed["absences"][0];
    assert_eq!(
        a["intervals"],
        json!([{ "continuousStart": "2024-01-08", "continuousEnd": "2024-03-01", "isPartialDay": false }])
    );
    assert_eq!(a["longTermLeaveGroups"], json!([{ "groupId": "10A", "coveringStaffId": "s3" }]));

    // 10A (maths) is covered by the group arrangement; art still needs cover.
    let events = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "cover.events",
        json!({ "from": "2024-01-15", "to": "2024-01-19" }),
    );
    let ids: Vec<&str> = events["events"]
        .as_array()
        .expect("events")
        .iter()
        .filter_map(|e| e["eventId"].as_str())
        .collect();
    assert_eq!(ids, vec!["art"]);
}

#[test]
fn normalize_previews_intervals_without_saving() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = seeded_workspace(&mut stdin, &mut reader, "coverd-absences-normalize");

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "absences.normalize",
        json!({ "dates": ["2024-01-03", "2024-01-01", "2024-01-02", "2024-01-05", "2024-01-09"] }),
    );
    assert_eq!(
        preview["intervals"],
        json!([
            { "continuousStart": "2024-01-01", "continuousEnd": "2024-01-03", "isPartialDay": false },
            { "individualDates": ["2024-01-05", "2024-01-09"], "isPartialDay": false }
        ])
    );

    let e = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "absences.normalize",
        json!({ "dates": ["2024-01-03"], "isFullDay": false, "startTime": "09:00" }),
    );
    assert_eq!(field(&e), "dateGroups[0].endTime");

    let listed = request_ok(&mut stdin, &mut reader, "3", "absences.list", json!({}));
    assert_eq!(listed["absences"], json!([]));
}
