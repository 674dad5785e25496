use mockset::{
    manager::{is_patched, objects},
    prelude::*,
};

#[derive(Debug, Default, Model)]
#[model(label = "Car")]
pub struct Car {
    pub id: i64,
    pub speed: i64,
}

fn fast_car_count() -> MockResult<usize> {
    Ok(Car::objects()?
        .filter(lookups! { "speed__gte" => 100 })?
        .count())
}

#[test]
fn code_under_test_sees_the_patched_set() {
    let (_guard, cars) = Car::patch_objects([
        Car { id: 1, speed: 90 },
        Car { id: 2, speed: 140 },
    ]);

    assert_eq!(fast_car_count().unwrap(), 1);

    cars.add([Car { id: 3, speed: 200 }]);
    assert_eq!(fast_car_count().unwrap(), 2);
}

#[test]
fn unpatched_models_report_the_disabled_connection() {
    let err = fast_car_count().unwrap_err();

    assert_eq!(
        err,
        MockError::NotSupported("Mock database tried to execute SQL for Car model.".into())
    );
}

#[test]
fn patches_are_undone_on_drop() {
    {
        let (_guard, _) = Car::patch_objects(Vec::new());
        assert!(is_patched("Car"));
    }

    assert!(!is_patched("Car"));
    assert!(objects("Car").is_err());
}

#[test]
fn model_mocker_emulates_inserts_and_updates() {
    let mocker = ModelMocker::for_model::<Car>();

    let first = mocker.save(Car { speed: 10, ..Default::default() }).unwrap();
    let second = mocker.save(Car { speed: 20, ..Default::default() }).unwrap();

    assert_eq!(first.pk(), Value::Int(1));
    assert_eq!(second.pk(), Value::Int(2));

    mocker.save(Car { id: 2, speed: 99 }).unwrap();

    let stored = Car::objects().unwrap().get(lookups! { "pk" => 2 }).unwrap();
    assert!(stored.ptr_eq(&second));
    assert_eq!(stored.downcast_ref::<Car>().map(|car| car.speed), Some(99));
    assert_eq!(Car::objects().unwrap().count(), 2);
}
